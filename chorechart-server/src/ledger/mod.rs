//! Points ledger and reward redemption rules.
//!
//! Every operation reads the rows it needs, checks its preconditions and
//! applies its writes inside one [`LedgerStore::with_tx`] call, so the balance
//! check and the deduction cannot interleave with another request.

mod store;
#[cfg(test)]
mod tests;

pub use store::{LedgerStore, LedgerTx};

use chorechart_shared::domain::{ActivityKind, MASTER_PERSON_ID, REDEEMED_SUFFIX};
use chrono::{NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use crate::storage::StorageError;
use crate::storage::models::{Chore, NewActivity, NewRedemption, Person, Reward};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("chore already completed")]
    AlreadyCompleted,
    #[error("reward already redeemed")]
    AlreadyRedeemed,
    #[error("reward already fulfilled")]
    AlreadyFulfilled,
    #[error("reward has not been redeemed yet")]
    NotRedeemedYet,
    #[error("not authorized: {0}")]
    NotAuthorized(&'static str),
    #[error("insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i32, required: i32 },
    #[error("reward is reserved for another person")]
    NotEligible,
    #[error("invalid amount: {0}")]
    InvalidAmount(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// Rule violations are expected outcomes; only storage failures are faults.
    pub fn is_rule_violation(&self) -> bool {
        !matches!(self, LedgerError::Storage(_))
    }
}

/// Identity the ledger acts for. Resolved by the auth layer and trusted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub person_id: i32,
    pub name: String,
    pub is_admin: bool,
    pub is_master: bool,
}

impl Actor {
    pub fn master(name: &str) -> Self {
        Self {
            person_id: MASTER_PERSON_ID,
            name: name.to_string(),
            is_admin: true,
            is_master: true,
        }
    }

    fn require_admin(&self, what: &'static str) -> Result<(), LedgerError> {
        if self.is_admin || self.is_master {
            Ok(())
        } else {
            Err(LedgerError::NotAuthorized(what))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChoreCompletion {
    pub chore: Chore,
    /// `(person_id, new_balance)` when the chore carried an owner to credit.
    pub credited: Option<(i32, i32)>,
}

#[derive(Debug, Clone)]
pub struct Redemption {
    /// The one-time row that was marked, or the instance spawned from a recurring reward.
    pub reward: Reward,
    pub spawned: bool,
    pub new_balance: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoreRemoval {
    Soft,
    Hard,
}

#[derive(Clone)]
pub struct Ledger<S> {
    store: S,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn complete_chore(
        &self,
        chore_id: i32,
        actor: &Actor,
    ) -> Result<ChoreCompletion, LedgerError> {
        let who = actor.clone();
        let res = self
            .store
            .with_tx(move |tx| complete_chore(tx, chore_id, &who, now()))
            .await;
        trace_outcome("complete_chore", chore_id, actor, &res);
        res
    }

    pub async fn redeem_reward(
        &self,
        reward_id: i32,
        actor: &Actor,
    ) -> Result<Redemption, LedgerError> {
        let who = actor.clone();
        let res = self
            .store
            .with_tx(move |tx| redeem_reward(tx, reward_id, &who, now()))
            .await;
        trace_outcome("redeem_reward", reward_id, actor, &res);
        res
    }

    pub async fn fulfill_reward(&self, reward_id: i32, actor: &Actor) -> Result<Reward, LedgerError> {
        let who = actor.clone();
        let res = self
            .store
            .with_tx(move |tx| fulfill_reward(tx, reward_id, &who, now()))
            .await;
        trace_outcome("fulfill_reward", reward_id, actor, &res);
        res
    }

    pub async fn award_bonus_points(
        &self,
        person_id: i32,
        amount: i32,
        actor: &Actor,
    ) -> Result<Person, LedgerError> {
        let who = actor.clone();
        let res = self
            .store
            .with_tx(move |tx| award_bonus_points(tx, person_id, amount, &who, now()))
            .await;
        trace_outcome("award_bonus_points", person_id, actor, &res);
        res
    }

    pub async fn reset_points(
        &self,
        person_id: i32,
        new_balance: i32,
        actor: &Actor,
    ) -> Result<Person, LedgerError> {
        let who = actor.clone();
        let res = self
            .store
            .with_tx(move |tx| reset_points(tx, person_id, new_balance, &who, now()))
            .await;
        trace_outcome("reset_points", person_id, actor, &res);
        res
    }

    pub async fn delete_chore(
        &self,
        chore_id: i32,
        actor: &Actor,
    ) -> Result<ChoreRemoval, LedgerError> {
        let who = actor.clone();
        let res = self
            .store
            .with_tx(move |tx| delete_chore(tx, chore_id, &who, now()))
            .await;
        trace_outcome("delete_chore", chore_id, actor, &res);
        res
    }

    pub async fn delete_reward(&self, reward_id: i32, actor: &Actor) -> Result<(), LedgerError> {
        let who = actor.clone();
        let res = self
            .store
            .with_tx(move |tx| delete_reward(tx, reward_id, &who, now()))
            .await;
        trace_outcome("delete_reward", reward_id, actor, &res);
        res
    }

    pub async fn delete_person(&self, person_id: i32, actor: &Actor) -> Result<Person, LedgerError> {
        let who = actor.clone();
        let res = self
            .store
            .with_tx(move |tx| delete_person(tx, person_id, &who, now()))
            .await;
        trace_outcome("delete_person", person_id, actor, &res);
        res
    }

    pub async fn reset_daily_chores(&self, actor: &Actor) -> Result<usize, LedgerError> {
        let who = actor.clone();
        let res = self
            .store
            .with_tx(move |tx| reset_daily_chores(tx, &who, now()))
            .await;
        trace_outcome("reset_daily_chores", 0, actor, &res);
        res
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn trace_outcome<T>(op: &'static str, id: i32, actor: &Actor, res: &Result<T, LedgerError>) {
    match res {
        Ok(_) => info!(op, id, actor_id = actor.person_id, actor = %actor.name, "ledger: applied"),
        Err(e) if e.is_rule_violation() => {
            warn!(op, id, actor_id = actor.person_id, actor = %actor.name, error = %e, "ledger: rejected")
        }
        // storage faults are logged by the HTTP error mapping
        Err(_) => {}
    }
}

fn log_activity(
    tx: &mut dyn LedgerTx,
    kind: ActivityKind,
    description: String,
    user_name: Option<&str>,
    at: NaiveDateTime,
) -> Result<(), LedgerError> {
    tx.append_activity(NewActivity {
        date: at,
        kind: kind.as_str().to_string(),
        description,
        user_name: user_name.map(str::to_string),
    })?;
    Ok(())
}

fn live_chore(tx: &mut dyn LedgerTx, chore_id: i32) -> Result<Chore, LedgerError> {
    match tx.chore(chore_id)? {
        Some(c) if !c.deleted => Ok(c),
        _ => Err(LedgerError::NotFound("chore")),
    }
}

fn existing_reward(tx: &mut dyn LedgerTx, reward_id: i32) -> Result<Reward, LedgerError> {
    tx.reward(reward_id)?.ok_or(LedgerError::NotFound("reward"))
}

fn existing_person(tx: &mut dyn LedgerTx, person_id: i32) -> Result<Person, LedgerError> {
    tx.person(person_id)?.ok_or(LedgerError::NotFound("person"))
}

/// Applies `delta` to the balance and `bonus` to the bonus total, refusing
/// results that do not fit the column type.
fn credit(
    tx: &mut dyn LedgerTx,
    person: &Person,
    delta: i32,
    bonus: i32,
    at: NaiveDateTime,
) -> Result<i32, LedgerError> {
    let points = person
        .points
        .checked_add(delta)
        .ok_or(LedgerError::InvalidAmount("balance out of range"))?;
    let bonus_points = person
        .bonus_points
        .checked_add(bonus)
        .ok_or(LedgerError::InvalidAmount("bonus total out of range"))?;
    tx.set_balance(person.id, points, bonus_points, at)?;
    Ok(points)
}

fn complete_chore(
    tx: &mut dyn LedgerTx,
    chore_id: i32,
    actor: &Actor,
    at: NaiveDateTime,
) -> Result<ChoreCompletion, LedgerError> {
    let chore = live_chore(tx, chore_id)?;
    if chore.completed {
        return Err(LedgerError::AlreadyCompleted);
    }
    let owns = chore
        .assigned_to_id
        .is_some_and(|owner| owner == actor.person_id);
    let unassigned = chore.assigned_to_id.is_none();
    if !(actor.is_admin || owns || unassigned) {
        return Err(LedgerError::NotAuthorized(
            "chore is assigned to someone else",
        ));
    }

    tx.mark_chore_completed(chore.id, at)?;

    let credited = match chore.assigned_to_id {
        Some(owner_id) => {
            // A dangling owner id earns nobody anything; the completion still stands.
            match tx.person(owner_id)? {
                Some(owner) => Some((owner.id, credit(tx, &owner, chore.points, 0, at)?)),
                None => None,
            }
        }
        None => {
            if chore.assigned_to.is_some() {
                debug!(chore_id, "chore has only a free-text assignee; no points awarded");
            }
            None
        }
    };

    log_activity(
        tx,
        ActivityKind::ChoreCompleted,
        format!("Completed chore: {} (+{} points)", chore.title, chore.points),
        Some(&actor.name),
        at,
    )?;

    let chore = live_chore(tx, chore_id)?;
    Ok(ChoreCompletion { chore, credited })
}

fn redeem_reward(
    tx: &mut dyn LedgerTx,
    reward_id: i32,
    actor: &Actor,
    at: NaiveDateTime,
) -> Result<Redemption, LedgerError> {
    let reward = existing_reward(tx, reward_id)?;
    if actor.is_master {
        return Err(LedgerError::NotAuthorized(
            "the master identity has no point balance",
        ));
    }
    let person = existing_person(tx, actor.person_id)?;
    if reward.is_one_time && reward.completed {
        return Err(LedgerError::AlreadyRedeemed);
    }
    if person.points < reward.points_required {
        return Err(LedgerError::InsufficientPoints {
            balance: person.points,
            required: reward.points_required,
        });
    }
    if reward
        .assigned_to_id
        .is_some_and(|owner| owner != person.id)
    {
        return Err(LedgerError::NotEligible);
    }

    let (redeemed, spawned) = if reward.is_one_time {
        tx.mark_reward_redeemed(reward.id, person.id, at)?;
        (existing_reward(tx, reward.id)?, false)
    } else {
        let instance = tx.insert_redemption(NewRedemption {
            title: format!("{}{}", reward.title, REDEEMED_SUFFIX),
            points_required: reward.points_required,
            completed: true,
            date_completed: Some(at),
            redeemed_by_id: Some(person.id),
            redeemed_at: Some(at),
            is_one_time: true,
            is_redemption: true,
            created_at: at,
            updated_at: at,
        })?;
        (instance, true)
    };

    let new_balance = credit(tx, &person, -reward.points_required, 0, at)?;
    log_activity(
        tx,
        ActivityKind::RewardRedeemed,
        format!(
            "Redeemed reward: {} (-{} points)",
            reward.title, reward.points_required
        ),
        Some(&person.name),
        at,
    )?;

    Ok(Redemption {
        reward: redeemed,
        spawned,
        new_balance,
    })
}

fn fulfill_reward(
    tx: &mut dyn LedgerTx,
    reward_id: i32,
    actor: &Actor,
    at: NaiveDateTime,
) -> Result<Reward, LedgerError> {
    actor.require_admin("only admins can fulfill rewards")?;
    let reward = existing_reward(tx, reward_id)?;
    if !reward.completed {
        return Err(LedgerError::NotRedeemedYet);
    }
    if reward.fulfilled {
        return Err(LedgerError::AlreadyFulfilled);
    }
    tx.mark_reward_fulfilled(reward.id, at)?;

    let redeemer = match reward.redeemed_by_id {
        Some(pid) => tx.person(pid)?.map(|p| p.name),
        None => None,
    };
    let description = match redeemer {
        Some(name) => format!("Fulfilled reward: {} for {}", reward.title, name),
        None => format!("Fulfilled reward: {}", reward.title),
    };
    log_activity(
        tx,
        ActivityKind::RewardFulfilled,
        description,
        Some(&actor.name),
        at,
    )?;
    existing_reward(tx, reward.id)
}

fn award_bonus_points(
    tx: &mut dyn LedgerTx,
    person_id: i32,
    amount: i32,
    actor: &Actor,
    at: NaiveDateTime,
) -> Result<Person, LedgerError> {
    actor.require_admin("only admins can award bonus points")?;
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount("bonus points must be positive"));
    }
    let person = existing_person(tx, person_id)?;
    credit(tx, &person, amount, amount, at)?;
    log_activity(
        tx,
        ActivityKind::BonusAwarded,
        format!("{} bonus points awarded to {}", amount, person.name),
        Some(&person.name),
        at,
    )?;
    existing_person(tx, person.id)
}

fn reset_points(
    tx: &mut dyn LedgerTx,
    person_id: i32,
    new_balance: i32,
    actor: &Actor,
    at: NaiveDateTime,
) -> Result<Person, LedgerError> {
    actor.require_admin("only admins can reset points")?;
    if new_balance < 0 {
        return Err(LedgerError::InvalidAmount("points cannot be negative"));
    }
    let person = existing_person(tx, person_id)?;
    tx.reset_points(person.id, new_balance, at)?;
    log_activity(
        tx,
        ActivityKind::PointsReset,
        format!("Points reset to {} for {}", new_balance, person.name),
        Some(&person.name),
        at,
    )?;
    existing_person(tx, person.id)
}

fn delete_chore(
    tx: &mut dyn LedgerTx,
    chore_id: i32,
    actor: &Actor,
    at: NaiveDateTime,
) -> Result<ChoreRemoval, LedgerError> {
    actor.require_admin("only admins can delete chores")?;
    let chore = live_chore(tx, chore_id)?;
    let removal = if chore.is_daily {
        tx.soft_delete_chore(chore.id, at)?;
        ChoreRemoval::Soft
    } else {
        tx.delete_chore(chore.id)?;
        ChoreRemoval::Hard
    };
    log_activity(
        tx,
        ActivityKind::ChoreDeleted,
        format!("Deleted chore: {}", chore.title),
        Some(&actor.name),
        at,
    )?;
    Ok(removal)
}

fn delete_reward(
    tx: &mut dyn LedgerTx,
    reward_id: i32,
    actor: &Actor,
    at: NaiveDateTime,
) -> Result<(), LedgerError> {
    actor.require_admin("only admins can delete rewards")?;
    let reward = existing_reward(tx, reward_id)?;
    tx.delete_reward(reward.id)?;
    log_activity(
        tx,
        ActivityKind::RewardDeleted,
        format!("Deleted reward: {}", reward.title),
        Some(&actor.name),
        at,
    )
}

fn delete_person(
    tx: &mut dyn LedgerTx,
    person_id: i32,
    actor: &Actor,
    at: NaiveDateTime,
) -> Result<Person, LedgerError> {
    actor.require_admin("only admins can delete people")?;
    let person = existing_person(tx, person_id)?;
    tx.delete_person_cascade(person.id)?;
    log_activity(
        tx,
        ActivityKind::PersonDeleted,
        format!("Deleted person: {}", person.name),
        Some(&actor.name),
        at,
    )?;
    Ok(person)
}

fn reset_daily_chores(
    tx: &mut dyn LedgerTx,
    actor: &Actor,
    at: NaiveDateTime,
) -> Result<usize, LedgerError> {
    actor.require_admin("only admins can reset daily chores")?;
    let count = tx.reset_daily_chores(at)?;
    log_activity(
        tx,
        ActivityKind::DailyChoresReset,
        format!("Reset {} daily chores", count),
        Some(&actor.name),
        at,
    )?;
    Ok(count)
}

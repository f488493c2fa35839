use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDateTime, Utc};

use super::*;
use crate::storage::models::NewActivity;

/// In-memory ledger persistence. A transaction works on a copy of the state
/// and publishes it only when the closure succeeds.
#[derive(Clone, Default)]
struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Clone, Default)]
struct MemoryState {
    persons: BTreeMap<i32, Person>,
    chores: BTreeMap<i32, Chore>,
    rewards: BTreeMap<i32, Reward>,
    activity: Vec<NewActivity>,
    next_id: i32,
}

impl MemoryState {
    fn id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

impl LedgerStore for MemoryStore {
    fn with_tx<T, F>(&self, f: F) -> impl Future<Output = Result<T, LedgerError>> + Send
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, LedgerError> + Send + 'static,
    {
        let result = {
            let mut guard = self.state.lock().unwrap();
            let mut working = guard.clone();
            let out = f(&mut working);
            if out.is_ok() {
                *guard = working;
            }
            out
        };
        std::future::ready(result)
    }
}

impl LedgerTx for MemoryState {
    fn person(&mut self, id: i32) -> Result<Option<Person>, StorageError> {
        Ok(self.persons.get(&id).cloned())
    }

    fn chore(&mut self, id: i32) -> Result<Option<Chore>, StorageError> {
        Ok(self.chores.get(&id).cloned())
    }

    fn reward(&mut self, id: i32) -> Result<Option<Reward>, StorageError> {
        Ok(self.rewards.get(&id).cloned())
    }

    fn set_balance(
        &mut self,
        person_id: i32,
        points: i32,
        bonus_points: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        if let Some(p) = self.persons.get_mut(&person_id) {
            p.points = points;
            p.bonus_points = bonus_points;
            p.updated_at = at;
        }
        Ok(())
    }

    fn reset_points(
        &mut self,
        person_id: i32,
        balance: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        if let Some(p) = self.persons.get_mut(&person_id) {
            p.points = balance;
            p.bonus_points = 0;
            p.last_reset = at;
            p.updated_at = at;
        }
        Ok(())
    }

    fn delete_person_cascade(&mut self, person_id: i32) -> Result<(), StorageError> {
        self.chores
            .retain(|_, c| c.assigned_to_id != Some(person_id));
        self.rewards.retain(|_, r| {
            r.assigned_to_id != Some(person_id)
                && !(r.is_redemption && r.redeemed_by_id == Some(person_id))
        });
        for r in self.rewards.values_mut() {
            if r.redeemed_by_id == Some(person_id) {
                r.redeemed_by_id = None;
            }
        }
        self.persons.remove(&person_id);
        Ok(())
    }

    fn mark_chore_completed(
        &mut self,
        chore_id: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        if let Some(c) = self.chores.get_mut(&chore_id) {
            c.completed = true;
            c.date_completed = Some(at);
            c.updated_at = at;
        }
        Ok(())
    }

    fn soft_delete_chore(&mut self, chore_id: i32, at: NaiveDateTime) -> Result<(), StorageError> {
        if let Some(c) = self.chores.get_mut(&chore_id) {
            c.deleted = true;
            c.updated_at = at;
        }
        Ok(())
    }

    fn delete_chore(&mut self, chore_id: i32) -> Result<(), StorageError> {
        self.chores.remove(&chore_id);
        Ok(())
    }

    fn reset_daily_chores(&mut self, at: NaiveDateTime) -> Result<usize, StorageError> {
        let mut n = 0;
        for c in self.chores.values_mut().filter(|c| c.is_daily && !c.deleted) {
            c.completed = false;
            c.date_completed = None;
            c.updated_at = at;
            n += 1;
        }
        for p in self.persons.values_mut() {
            p.last_daily_chores_added = at;
        }
        Ok(n)
    }

    fn mark_reward_redeemed(
        &mut self,
        reward_id: i32,
        by_person: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        if let Some(r) = self.rewards.get_mut(&reward_id) {
            r.completed = true;
            r.date_completed = Some(at);
            r.redeemed_by_id = Some(by_person);
            r.redeemed_at = Some(at);
            r.updated_at = at;
        }
        Ok(())
    }

    fn insert_redemption(&mut self, row: NewRedemption) -> Result<Reward, StorageError> {
        let id = self.id();
        let reward = Reward {
            id,
            title: row.title,
            points_required: row.points_required,
            assigned_to_id: None,
            assigned_to: None,
            completed: row.completed,
            date_completed: row.date_completed,
            redeemed_by_id: row.redeemed_by_id,
            redeemed_at: row.redeemed_at,
            fulfilled: false,
            fulfilled_at: None,
            is_one_time: row.is_one_time,
            is_redemption: row.is_redemption,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        self.rewards.insert(id, reward.clone());
        Ok(reward)
    }

    fn mark_reward_fulfilled(
        &mut self,
        reward_id: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        if let Some(r) = self.rewards.get_mut(&reward_id) {
            r.fulfilled = true;
            r.fulfilled_at = Some(at);
            r.updated_at = at;
        }
        Ok(())
    }

    fn delete_reward(&mut self, reward_id: i32) -> Result<(), StorageError> {
        self.rewards.remove(&reward_id);
        Ok(())
    }

    fn append_activity(&mut self, entry: NewActivity) -> Result<(), StorageError> {
        self.activity.push(entry);
        Ok(())
    }
}

fn ts() -> NaiveDateTime {
    Utc::now().naive_utc()
}

struct Fixture {
    store: MemoryStore,
    ledger: Ledger<MemoryStore>,
}

impl Fixture {
    fn new() -> Self {
        let store = MemoryStore::default();
        Self {
            ledger: Ledger::new(store.clone()),
            store,
        }
    }

    fn person(&self, name: &str, points: i32, is_admin: bool) -> Actor {
        let mut st = self.store.state.lock().unwrap();
        let id = st.id();
        st.persons.insert(
            id,
            Person {
                id,
                name: name.into(),
                points,
                bonus_points: 0,
                last_reset: ts(),
                last_daily_chores_added: ts(),
                avatar: "default_avatar.png".into(),
                color: "#ffffff".into(),
                order_index: 0,
                pin_hash: None,
                is_admin,
                created_at: ts(),
                updated_at: ts(),
            },
        );
        Actor {
            person_id: id,
            name: name.into(),
            is_admin,
            is_master: false,
        }
    }

    fn chore(&self, title: &str, points: i32, owner: Option<i32>, is_daily: bool) -> i32 {
        let mut st = self.store.state.lock().unwrap();
        let id = st.id();
        st.chores.insert(
            id,
            Chore {
                id,
                title: title.into(),
                assigned_to_id: owner,
                assigned_to: None,
                points,
                completed: false,
                date_completed: None,
                is_daily,
                due_date: None,
                deleted: false,
                created_at: ts(),
                updated_at: ts(),
            },
        );
        id
    }

    fn reward(&self, title: &str, cost: i32, owner: Option<i32>, one_time: bool) -> i32 {
        let mut st = self.store.state.lock().unwrap();
        let id = st.id();
        st.rewards.insert(
            id,
            Reward {
                id,
                title: title.into(),
                points_required: cost,
                assigned_to_id: owner,
                assigned_to: None,
                completed: false,
                date_completed: None,
                redeemed_by_id: None,
                redeemed_at: None,
                fulfilled: false,
                fulfilled_at: None,
                is_one_time: one_time,
                is_redemption: false,
                created_at: ts(),
                updated_at: ts(),
            },
        );
        id
    }

    fn balance(&self, person_id: i32) -> i32 {
        self.store.state.lock().unwrap().persons[&person_id].points
    }

    fn reward_row(&self, id: i32) -> Reward {
        self.store.state.lock().unwrap().rewards[&id].clone()
    }

    fn chore_row(&self, id: i32) -> Option<Chore> {
        self.store.state.lock().unwrap().chores.get(&id).cloned()
    }

    fn activity_kinds(&self) -> Vec<String> {
        self.store
            .state
            .lock()
            .unwrap()
            .activity
            .iter()
            .map(|a| a.kind.clone())
            .collect()
    }
}

#[tokio::test]
async fn completing_assigned_chore_credits_owner() {
    let f = Fixture::new();
    let kid = f.person("Kid", 3, false);
    let chore = f.chore("Dishes", 5, Some(kid.person_id), false);

    let done = f.ledger.complete_chore(chore, &kid).await.unwrap();
    assert!(done.chore.completed);
    assert!(done.chore.date_completed.is_some());
    assert_eq!(done.credited, Some((kid.person_id, 8)));
    assert_eq!(f.balance(kid.person_id), 8);
    assert_eq!(f.activity_kinds(), vec!["chore_completed"]);
}

#[tokio::test]
async fn completing_twice_fails_and_keeps_balance() {
    let f = Fixture::new();
    let kid = f.person("Kid", 0, false);
    let chore = f.chore("Dishes", 5, Some(kid.person_id), false);
    f.ledger.complete_chore(chore, &kid).await.unwrap();

    let err = f.ledger.complete_chore(chore, &kid).await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyCompleted));
    assert_eq!(f.balance(kid.person_id), 5);
    assert_eq!(f.activity_kinds().len(), 1);
}

#[tokio::test]
async fn completing_someone_elses_chore_is_not_authorized() {
    let f = Fixture::new();
    let kid = f.person("Kid", 0, false);
    let sibling = f.person("Sibling", 0, false);
    let chore = f.chore("Laundry", 2, Some(kid.person_id), false);

    let err = f.ledger.complete_chore(chore, &sibling).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotAuthorized(_)));
    assert!(!f.chore_row(chore).unwrap().completed);
}

#[tokio::test]
async fn admin_completes_for_owner() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let kid = f.person("Kid", 1, false);
    let chore = f.chore("Trash", 4, Some(kid.person_id), false);

    f.ledger.complete_chore(chore, &parent).await.unwrap();
    assert_eq!(f.balance(kid.person_id), 5);
    assert_eq!(f.balance(parent.person_id), 0);
}

#[tokio::test]
async fn unassigned_chore_awards_nothing() {
    let f = Fixture::new();
    let kid = f.person("Kid", 2, false);
    let chore = f.chore("Sweep", 3, None, false);
    {
        let mut st = f.store.state.lock().unwrap();
        st.chores.get_mut(&chore).unwrap().assigned_to = Some("Kid".into());
    }

    let done = f.ledger.complete_chore(chore, &kid).await.unwrap();
    assert_eq!(done.credited, None);
    assert_eq!(f.balance(kid.person_id), 2);
}

#[tokio::test]
async fn soft_deleted_chore_cannot_be_completed() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let chore = f.chore("Beds", 1, None, true);
    f.ledger.delete_chore(chore, &parent).await.unwrap();

    let err = f.ledger.complete_chore(chore, &parent).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound("chore")));
}

#[tokio::test]
async fn one_time_reward_redeems_once() {
    let f = Fixture::new();
    let kid = f.person("Kid", 10, false);
    let reward = f.reward("Ice cream", 4, None, true);

    let r = f.ledger.redeem_reward(reward, &kid).await.unwrap();
    assert!(!r.spawned);
    assert_eq!(r.new_balance, 6);
    assert_eq!(r.reward.id, reward);
    assert_eq!(r.reward.redeemed_by_id, Some(kid.person_id));
    assert!(r.reward.redeemed_at.is_some());

    let err = f.ledger.redeem_reward(reward, &kid).await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyRedeemed));
    assert_eq!(f.balance(kid.person_id), 6);
}

#[tokio::test]
async fn recurring_reward_forks_instances() {
    let f = Fixture::new();
    let kid = f.person("Kid", 9, false);
    let reward = f.reward("Screen time", 3, None, false);

    for _ in 0..3 {
        let r = f.ledger.redeem_reward(reward, &kid).await.unwrap();
        assert!(r.spawned);
        assert_ne!(r.reward.id, reward);
        assert_eq!(r.reward.title, "Screen time (Redeemed)");
        assert!(r.reward.is_one_time);
        assert!(r.reward.completed);
        assert_eq!(r.reward.assigned_to_id, None);
    }

    let catalog = f.reward_row(reward);
    assert!(!catalog.completed);
    assert_eq!(catalog.redeemed_by_id, None);
    let st = f.store.state.lock().unwrap();
    let spawned = st
        .rewards
        .values()
        .filter(|r| r.title.ends_with("(Redeemed)"))
        .count();
    assert_eq!(spawned, 3);
    assert_eq!(st.persons[&kid.person_id].points, 0);
}

#[tokio::test]
async fn insufficient_points_leaves_balance() {
    let f = Fixture::new();
    let kid = f.person("Kid", 2, false);
    let reward = f.reward("Bike", 50, None, true);

    let err = f.ledger.redeem_reward(reward, &kid).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientPoints {
            balance: 2,
            required: 50
        }
    ));
    assert_eq!(f.balance(kid.person_id), 2);
    assert!(!f.reward_row(reward).completed);
    assert!(f.activity_kinds().is_empty());
}

#[tokio::test]
async fn reserved_reward_rejects_other_people() {
    let f = Fixture::new();
    let kid = f.person("Kid", 10, false);
    let sibling = f.person("Sibling", 10, false);
    let reward = f.reward("Sleepover", 5, Some(kid.person_id), true);

    let err = f.ledger.redeem_reward(reward, &sibling).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotEligible));
    f.ledger.redeem_reward(reward, &kid).await.unwrap();
    assert_eq!(f.balance(kid.person_id), 5);
    assert_eq!(f.balance(sibling.person_id), 10);
}

#[tokio::test]
async fn master_identity_cannot_redeem() {
    let f = Fixture::new();
    let reward = f.reward("Treat", 0, None, true);
    let err = f
        .ledger
        .redeem_reward(reward, &Actor::master("Admin"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotAuthorized(_)));
}

#[tokio::test]
async fn fulfill_walks_the_state_machine() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let kid = f.person("Kid", 5, false);
    let reward = f.reward("Movie Night", 5, None, true);

    let err = f.ledger.fulfill_reward(reward, &parent).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotRedeemedYet));

    f.ledger.redeem_reward(reward, &kid).await.unwrap();
    let err = f.ledger.fulfill_reward(reward, &kid).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotAuthorized(_)));

    let done = f.ledger.fulfill_reward(reward, &parent).await.unwrap();
    assert!(done.fulfilled);
    assert!(done.fulfilled_at.is_some());

    let err = f.ledger.fulfill_reward(reward, &parent).await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyFulfilled));
}

#[tokio::test]
async fn bonus_points_accumulate_and_reset_clears() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let kid = f.person("Kid", 1, false);

    let p = f
        .ledger
        .award_bonus_points(kid.person_id, 4, &parent)
        .await
        .unwrap();
    assert_eq!((p.points, p.bonus_points), (5, 4));

    for bad in [0, -3] {
        let err = f
            .ledger
            .award_bonus_points(kid.person_id, bad, &parent)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }
    let err = f
        .ledger
        .award_bonus_points(kid.person_id, 4, &kid)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotAuthorized(_)));

    let before = p.last_reset;
    let p = f.ledger.reset_points(kid.person_id, 2, &parent).await.unwrap();
    assert_eq!((p.points, p.bonus_points), (2, 0));
    assert!(p.last_reset >= before);

    let err = f
        .ledger
        .reset_points(kid.person_id, -1, &parent)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));
    assert_eq!(
        f.activity_kinds(),
        vec!["bonus_awarded", "points_reset"]
    );
}

#[tokio::test]
async fn balances_never_wrap_past_i32() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let kid = f.person("Kid", 0, false);

    let p = f
        .ledger
        .award_bonus_points(kid.person_id, i32::MAX, &parent)
        .await
        .unwrap();
    assert_eq!(p.points, i32::MAX);

    let err = f
        .ledger
        .award_bonus_points(kid.person_id, i32::MAX, &parent)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));
    assert_eq!(f.balance(kid.person_id), i32::MAX);

    // the completion rolls back with the failed credit
    let chore = f.chore("One more", 1, Some(kid.person_id), false);
    let err = f.ledger.complete_chore(chore, &kid).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));
    assert!(!f.chore_row(chore).unwrap().completed);
    assert_eq!(f.balance(kid.person_id), i32::MAX);
    assert_eq!(f.activity_kinds(), vec!["bonus_awarded"]);
}

#[tokio::test]
async fn zero_cost_and_exact_balance_redemptions() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let kid = f.person("Kid", 0, false);
    let reward = f.reward("Sticker", 0, None, false);
    f.ledger.redeem_reward(reward, &kid).await.unwrap();

    // zero-cost redemption leaves the balance alone
    assert_eq!(f.balance(kid.person_id), 0);
    f.ledger.award_bonus_points(kid.person_id, 3, &parent).await.unwrap();
    let cost = f.reward("Game", 3, None, true);
    let r = f.ledger.redeem_reward(cost, &kid).await.unwrap();
    assert_eq!(r.new_balance, 0);
}

#[tokio::test]
async fn daily_chores_soft_delete_others_hard_delete() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let daily = f.chore("Feed cat", 1, None, true);
    let once = f.chore("Clean garage", 10, None, false);

    assert_eq!(
        f.ledger.delete_chore(daily, &parent).await.unwrap(),
        ChoreRemoval::Soft
    );
    assert!(f.chore_row(daily).unwrap().deleted);

    assert_eq!(
        f.ledger.delete_chore(once, &parent).await.unwrap(),
        ChoreRemoval::Hard
    );
    assert!(f.chore_row(once).is_none());

    let err = f.ledger.delete_chore(daily, &parent).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn deleting_reward_is_admin_only() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let kid = f.person("Kid", 0, false);
    let reward = f.reward("Sleepover", 20, None, true);

    let err = f.ledger.delete_reward(reward, &kid).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotAuthorized(_)));

    f.ledger.delete_reward(reward, &parent).await.unwrap();
    assert!(!f.store.state.lock().unwrap().rewards.contains_key(&reward));
    assert_eq!(f.activity_kinds(), vec!["reward_deleted"]);

    let err = f.ledger.delete_reward(reward, &parent).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound("reward")));
}

#[tokio::test]
async fn reset_daily_reopens_only_daily_chores() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let kid = f.person("Kid", 0, false);
    let daily = f.chore("Brush teeth", 1, Some(kid.person_id), true);
    let once = f.chore("Paint fence", 8, Some(kid.person_id), false);
    f.ledger.complete_chore(daily, &kid).await.unwrap();
    f.ledger.complete_chore(once, &kid).await.unwrap();

    let n = f.ledger.reset_daily_chores(&parent).await.unwrap();
    assert_eq!(n, 1);
    assert!(!f.chore_row(daily).unwrap().completed);
    assert!(f.chore_row(once).unwrap().completed);

    // reopened chore earns again
    f.ledger.complete_chore(daily, &kid).await.unwrap();
    assert_eq!(f.balance(kid.person_id), 10);
}

#[tokio::test]
async fn deleting_person_cascades() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let kid = f.person("Kid", 10, false);
    let other = f.person("Other", 0, false);
    f.chore("Mine", 1, Some(kid.person_id), false);
    let theirs = f.chore("Theirs", 1, Some(other.person_id), false);
    f.reward("Reserved", 1, Some(kid.person_id), true);
    let recurring = f.reward("Dessert", 2, None, false);
    f.ledger.redeem_reward(recurring, &kid).await.unwrap();
    let shared = f.reward("Zoo trip", 3, None, true);
    f.ledger.redeem_reward(shared, &kid).await.unwrap();

    let gone = f.ledger.delete_person(kid.person_id, &parent).await.unwrap();
    assert_eq!(gone.name, "Kid");

    let st = f.store.state.lock().unwrap();
    assert!(!st.persons.contains_key(&kid.person_id));
    assert_eq!(st.chores.len(), 1);
    assert!(st.chores.contains_key(&theirs));
    assert_eq!(st.rewards.len(), 2);
    assert!(st.rewards.contains_key(&recurring));
    // still awaiting fulfillment, redeemer unknown
    let zoo = &st.rewards[&shared];
    assert!(zoo.completed && !zoo.fulfilled);
    assert_eq!(zoo.redeemed_by_id, None);
}

#[tokio::test]
async fn failed_operation_publishes_nothing() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let err = f.ledger.delete_person(999, &parent).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound("person")));
    assert!(f.activity_kinds().is_empty());
}

#[tokio::test]
async fn dishes_to_movie_night() {
    let f = Fixture::new();
    let parent = f.person("Parent", 0, true);
    let p = f.person("P", 0, false);
    let dishes = f.chore("Dishes", 5, Some(p.person_id), false);
    let movie = f.reward("Movie Night", 5, None, true);

    f.ledger.complete_chore(dishes, &p).await.unwrap();
    assert_eq!(f.balance(p.person_id), 5);

    let r = f.ledger.redeem_reward(movie, &p).await.unwrap();
    assert_eq!(r.new_balance, 0);
    let row = f.reward_row(movie);
    assert!(row.completed);
    assert_eq!(row.redeemed_by_id, Some(p.person_id));

    let done = f.ledger.fulfill_reward(movie, &parent).await.unwrap();
    assert!(done.fulfilled);
    assert_eq!(
        f.activity_kinds(),
        vec!["chore_completed", "reward_redeemed", "reward_fulfilled"]
    );
}

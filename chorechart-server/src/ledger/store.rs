use std::future::Future;

use chrono::NaiveDateTime;

use super::LedgerError;
use crate::storage::StorageError;
use crate::storage::models::{Chore, NewActivity, NewRedemption, Person, Reward};

/// Row-level access the ledger needs while a transaction is open.
///
/// Every method runs inside the transaction started by [`LedgerStore::with_tx`];
/// none of them commit on their own.
pub trait LedgerTx {
    fn person(&mut self, id: i32) -> Result<Option<Person>, StorageError>;
    fn chore(&mut self, id: i32) -> Result<Option<Chore>, StorageError>;
    fn reward(&mut self, id: i32) -> Result<Option<Reward>, StorageError>;

    /// Writes the balance and bonus total computed by the ledger.
    fn set_balance(
        &mut self,
        person_id: i32,
        points: i32,
        bonus_points: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError>;
    fn reset_points(
        &mut self,
        person_id: i32,
        balance: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError>;
    fn delete_person_cascade(&mut self, person_id: i32) -> Result<(), StorageError>;

    fn mark_chore_completed(&mut self, chore_id: i32, at: NaiveDateTime)
    -> Result<(), StorageError>;
    fn soft_delete_chore(&mut self, chore_id: i32, at: NaiveDateTime) -> Result<(), StorageError>;
    fn delete_chore(&mut self, chore_id: i32) -> Result<(), StorageError>;
    /// Clears completion on every live daily chore; returns how many were touched.
    fn reset_daily_chores(&mut self, at: NaiveDateTime) -> Result<usize, StorageError>;

    fn mark_reward_redeemed(
        &mut self,
        reward_id: i32,
        by_person: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError>;
    fn insert_redemption(&mut self, row: NewRedemption) -> Result<Reward, StorageError>;
    fn mark_reward_fulfilled(
        &mut self,
        reward_id: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError>;
    fn delete_reward(&mut self, reward_id: i32) -> Result<(), StorageError>;

    fn append_activity(&mut self, entry: NewActivity) -> Result<(), StorageError>;
}

/// Persistence handle injected into the ledger.
///
/// `with_tx` runs `f` atomically: either all writes made through the
/// [`LedgerTx`] persist, or (when `f` fails) none do.
pub trait LedgerStore: Clone + Send + Sync + 'static {
    fn with_tx<T, F>(&self, f: F) -> impl Future<Output = Result<T, LedgerError>> + Send
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, LedgerError> + Send + 'static;
}

pub mod models;
pub mod schema;

use std::collections::HashMap;
use std::future::Future;

use chorechart_shared::domain::MASTER_PIN_KEY;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{
    Activity, AppSetting, Chore, ChoreChanges, NewActivity, NewAppSetting, NewChore, NewPerson,
    NewRedemption, NewReward, NewSession, Person, PersonChanges, Reward,
};
use tracing::trace;

use crate::ledger::{LedgerError, LedgerStore, LedgerTx};

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<diesel::result::Error> for LedgerError {
    fn from(value: diesel::result::Error) -> Self {
        LedgerError::Storage(StorageError::Database(value))
    }
}

/// Owned person fields for inserts; PIN already hashed.
#[derive(Debug, Clone)]
pub struct PersonInput {
    pub name: String,
    pub avatar: String,
    pub color: String,
    pub order_index: i32,
    pub pin_hash: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct ChoreInput {
    pub title: String,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub points: i32,
    pub is_daily: bool,
    pub due_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct RewardInput {
    pub title: String,
    pub points_required: i32,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub is_one_time: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RowFilter {
    pub assigned_to_id: Option<i32>,
    pub completed: Option<bool>,
}

/// Chore joined with the display name of its owner.
pub type ChoreRow = (Chore, Option<String>);
/// Reward joined with owner and redeemer names.
pub type RewardRow = (Reward, Option<String>, Option<String>);

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    // Setup wizard

    /// Stores the master PIN hash and the initial household in one transaction.
    /// Returns `None` when a master PIN already exists.
    pub async fn complete_setup(
        &self,
        master_pin_hash: &str,
        people: Vec<PersonInput>,
        log_entry: NewActivity,
    ) -> Result<Option<usize>, StorageError> {
        use schema::{activity_log, app_settings, persons};
        let pool = self.pool.clone();
        let master_hash = master_pin_hash.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<usize>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Option<usize>, StorageError> {
                let existing: i64 = app_settings::table
                    .filter(app_settings::key.eq(MASTER_PIN_KEY))
                    .count()
                    .get_result(conn)?;
                if existing > 0 {
                    return Ok(None);
                }
                diesel::insert_into(app_settings::table)
                    .values(&NewAppSetting {
                        key: MASTER_PIN_KEY,
                        value: &master_hash,
                    })
                    .execute(conn)?;
                for p in &people {
                    diesel::insert_into(persons::table)
                        .values(&NewPerson {
                            name: &p.name,
                            avatar: &p.avatar,
                            color: &p.color,
                            order_index: p.order_index,
                            pin_hash: p.pin_hash.as_deref(),
                            is_admin: p.is_admin,
                        })
                        .execute(conn)?;
                }
                diesel::insert_into(activity_log::table)
                    .values(&log_entry)
                    .execute(conn)?;
                Ok(Some(people.len()))
            })
        })
        .await?
    }

    // Persons

    pub async fn list_persons(&self) -> Result<Vec<Person>, StorageError> {
        use schema::persons::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Person>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(persons
                .order((order_index.asc(), created_at.asc(), id.asc()))
                .select(Person::as_select())
                .load(&mut conn)?)
        })
        .await?
    }

    /// People that can log in with a personal PIN, oldest first.
    pub async fn list_persons_with_pin(&self) -> Result<Vec<Person>, StorageError> {
        use schema::persons::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Person>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(persons
                .filter(pin_hash.is_not_null())
                .order(id.asc())
                .select(Person::as_select())
                .load(&mut conn)?)
        })
        .await?
    }

    pub async fn get_person(&self, person_id: i32) -> Result<Option<Person>, StorageError> {
        use schema::persons::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Person>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(persons
                .filter(id.eq(person_id))
                .select(Person::as_select())
                .first(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn create_person(&self, input: PersonInput) -> Result<Person, StorageError> {
        use schema::persons;
        let pool = self.pool.clone();
        trace!(name = %input.name, "create_person starting");
        tokio::task::spawn_blocking(move || -> Result<Person, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(diesel::insert_into(persons::table)
                .values(&NewPerson {
                    name: &input.name,
                    avatar: &input.avatar,
                    color: &input.color,
                    order_index: input.order_index,
                    pin_hash: input.pin_hash.as_deref(),
                    is_admin: input.is_admin,
                })
                .returning(Person::as_returning())
                .get_result(&mut conn)?)
        })
        .await?
    }

    /// Returns `None` when the person does not exist.
    pub async fn update_person(
        &self,
        person_id: i32,
        changes: PersonChanges,
    ) -> Result<Option<Person>, StorageError> {
        use schema::persons::dsl::*;
        if changes.is_empty() {
            return Err(StorageError::InvalidInput("no fields to update".into()));
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Person>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            Ok(diesel::update(persons.filter(id.eq(person_id)))
                .set((&changes, updated_at.eq(now)))
                .returning(Person::as_returning())
                .get_result(&mut conn)
                .optional()?)
        })
        .await?
    }

    // Chores

    pub async fn list_chores(&self, filter: RowFilter) -> Result<Vec<ChoreRow>, StorageError> {
        use schema::{chores, persons};
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<ChoreRow>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut q = chores::table
                .left_join(persons::table)
                .filter(chores::deleted.eq(false))
                .into_boxed();
            if let Some(owner) = filter.assigned_to_id {
                q = q.filter(chores::assigned_to_id.eq(owner));
            }
            if let Some(done) = filter.completed {
                q = q.filter(chores::completed.eq(done));
            }
            Ok(q.order((chores::created_at.desc(), chores::id.desc()))
                .select((Chore::as_select(), persons::name.nullable()))
                .load::<ChoreRow>(&mut conn)?)
        })
        .await?
    }

    /// Soft-deleted rows are only returned when `include_deleted` is set.
    pub async fn find_chore(
        &self,
        chore_id: i32,
        include_deleted: bool,
    ) -> Result<Option<ChoreRow>, StorageError> {
        use schema::{chores, persons};
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<ChoreRow>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut q = chores::table
                .left_join(persons::table)
                .filter(chores::id.eq(chore_id))
                .into_boxed();
            if !include_deleted {
                q = q.filter(chores::deleted.eq(false));
            }
            Ok(q.select((Chore::as_select(), persons::name.nullable()))
                .first::<ChoreRow>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn create_chore(&self, input: ChoreInput) -> Result<Chore, StorageError> {
        use schema::chores;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Chore, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(diesel::insert_into(chores::table)
                .values(&NewChore {
                    title: &input.title,
                    assigned_to_id: input.assigned_to_id,
                    assigned_to: input.assigned_to.as_deref(),
                    points: input.points,
                    is_daily: input.is_daily,
                    due_date: input.due_date,
                })
                .returning(Chore::as_returning())
                .get_result(&mut conn)?)
        })
        .await?
    }

    /// Returns `None` when the chore does not exist or is soft-deleted.
    pub async fn update_chore(
        &self,
        chore_id: i32,
        changes: ChoreChanges,
    ) -> Result<Option<Chore>, StorageError> {
        use schema::chores::dsl::*;
        if changes.is_empty() {
            return Err(StorageError::InvalidInput("no fields to update".into()));
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Chore>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            Ok(
                diesel::update(chores.filter(id.eq(chore_id)).filter(deleted.eq(false)))
                    .set((&changes, updated_at.eq(now)))
                    .returning(Chore::as_returning())
                    .get_result(&mut conn)
                    .optional()?,
            )
        })
        .await?
    }

    // Rewards

    pub async fn list_rewards(&self, filter: RowFilter) -> Result<Vec<RewardRow>, StorageError> {
        use schema::rewards;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<RewardRow>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut q = rewards::table.into_boxed();
            if let Some(owner) = filter.assigned_to_id {
                q = q.filter(rewards::assigned_to_id.eq(owner));
            }
            if let Some(done) = filter.completed {
                q = q.filter(rewards::completed.eq(done));
            }
            let rows = q
                .order((rewards::created_at.desc(), rewards::id.desc()))
                .select(Reward::as_select())
                .load::<Reward>(&mut conn)?;
            with_person_names(&mut conn, rows)
        })
        .await?
    }

    pub async fn get_reward(&self, reward_id: i32) -> Result<Option<RewardRow>, StorageError> {
        use schema::rewards;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<RewardRow>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = rewards::table
                .filter(rewards::id.eq(reward_id))
                .select(Reward::as_select())
                .first::<Reward>(&mut conn)
                .optional()?;
            Ok(with_person_names(&mut conn, row.into_iter().collect())?
                .into_iter()
                .next())
        })
        .await?
    }

    pub async fn create_reward(&self, input: RewardInput) -> Result<Reward, StorageError> {
        use schema::rewards;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Reward, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(diesel::insert_into(rewards::table)
                .values(&NewReward {
                    title: &input.title,
                    points_required: input.points_required,
                    assigned_to_id: input.assigned_to_id,
                    assigned_to: input.assigned_to.as_deref(),
                    is_one_time: input.is_one_time,
                })
                .returning(Reward::as_returning())
                .get_result(&mut conn)?)
        })
        .await?
    }

    /// Redeemed but not yet fulfilled, most recent redemption first.
    pub async fn list_pending_redemptions(&self) -> Result<Vec<RewardRow>, StorageError> {
        use schema::rewards;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<RewardRow>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rows = rewards::table
                .filter(rewards::completed.eq(true))
                .filter(rewards::fulfilled.eq(false))
                .order((rewards::redeemed_at.desc(), rewards::id.desc()))
                .select(Reward::as_select())
                .load::<Reward>(&mut conn)?;
            with_person_names(&mut conn, rows)
        })
        .await?
    }

    // Activity log

    pub async fn list_activity(
        &self,
        kind_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Activity>, StorageError> {
        use schema::activity_log::dsl::*;
        let pool = self.pool.clone();
        let kind_owned = kind_filter.map(|s| s.to_string());
        let limit = limit.clamp(1, 500);
        let offset = offset.max(0);
        tokio::task::spawn_blocking(move || -> Result<Vec<Activity>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut q = activity_log.into_boxed();
            if let Some(k) = kind_owned {
                q = q.filter(kind.eq(k));
            }
            Ok(q.order((date.desc(), id.desc()))
                .offset(offset)
                .limit(limit)
                .select(Activity::as_select())
                .load(&mut conn)?)
        })
        .await?
    }

    // Settings

    pub async fn list_settings(&self) -> Result<Vec<AppSetting>, StorageError> {
        use schema::app_settings::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<AppSetting>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(app_settings
                .order(key.asc())
                .select(AppSetting::as_select())
                .load(&mut conn)?)
        })
        .await?
    }

    pub async fn get_setting(&self, key_: &str) -> Result<Option<String>, StorageError> {
        use schema::app_settings::dsl::*;
        let pool = self.pool.clone();
        let k = key_.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<String>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(app_settings
                .filter(key.eq(&k))
                .select(value)
                .first::<String>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn put_setting(&self, key_: &str, value_: &str) -> Result<(), StorageError> {
        use schema::app_settings::dsl::*;
        let pool = self.pool.clone();
        let k = key_.to_string();
        let v = value_.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            diesel::insert_into(app_settings)
                .values(&NewAppSetting { key: &k, value: &v })
                .on_conflict(key)
                .do_update()
                .set(value.eq(&v))
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    // Session helpers for JWT inactivity windows
    pub async fn create_session(&self, jti_: &str, person_id_: i32) -> Result<(), StorageError> {
        use schema::sessions;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new = NewSession {
                jti: &j,
                person_id: person_id_,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    pub async fn delete_session(&self, jti_: &str) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let deleted = diesel::delete(sessions.filter(jti.eq(&j))).execute(&mut conn)?;
            Ok(deleted > 0)
        })
        .await?
    }

    /// Touch session atomically, but only if it hasn't expired.
    /// Returns `true` if the session was found and updated, `false` otherwise.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(&mut conn)?;
            Ok(updated > 0)
        })
        .await?
    }
}

impl LedgerStore for Store {
    fn with_tx<T, F>(&self, f: F) -> impl Future<Output = Result<T, LedgerError>> + Send
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, LedgerError> + Send + 'static,
    {
        let pool = self.pool.clone();
        async move {
            tokio::task::spawn_blocking(move || -> Result<T, LedgerError> {
                let mut conn = pool.get().map_err(StorageError::from)?;
                configure_sqlite_conn(&mut conn)?;
                // IMMEDIATE takes the write lock up front so concurrent
                // balance checks serialize instead of failing on upgrade.
                conn.immediate_transaction(|conn| f(&mut SqliteLedgerTx { conn }))
            })
            .await
            .map_err(StorageError::from)?
        }
    }
}

struct SqliteLedgerTx<'a> {
    conn: &'a mut SqliteConnection,
}

impl LedgerTx for SqliteLedgerTx<'_> {
    fn person(&mut self, person_id: i32) -> Result<Option<Person>, StorageError> {
        use schema::persons::dsl::*;
        Ok(persons
            .filter(id.eq(person_id))
            .select(Person::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn chore(&mut self, chore_id: i32) -> Result<Option<Chore>, StorageError> {
        use schema::chores::dsl::*;
        Ok(chores
            .filter(id.eq(chore_id))
            .select(Chore::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn reward(&mut self, reward_id: i32) -> Result<Option<Reward>, StorageError> {
        use schema::rewards::dsl::*;
        Ok(rewards
            .filter(id.eq(reward_id))
            .select(Reward::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn set_balance(
        &mut self,
        person_id: i32,
        balance: i32,
        bonus_total: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        use schema::persons::dsl::*;
        diesel::update(persons.filter(id.eq(person_id)))
            .set((
                points.eq(balance),
                bonus_points.eq(bonus_total),
                updated_at.eq(at),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn reset_points(
        &mut self,
        person_id: i32,
        balance: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        use schema::persons::dsl::*;
        diesel::update(persons.filter(id.eq(person_id)))
            .set((
                points.eq(balance),
                bonus_points.eq(0),
                last_reset.eq(at),
                updated_at.eq(at),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn delete_person_cascade(&mut self, person_id: i32) -> Result<(), StorageError> {
        use schema::{chores, persons, rewards, sessions};
        diesel::delete(chores::table.filter(chores::assigned_to_id.eq(person_id)))
            .execute(self.conn)?;
        let spawned_by_them = rewards::redeemed_by_id
            .eq(person_id)
            .and(rewards::is_redemption.eq(true));
        diesel::delete(
            rewards::table.filter(rewards::assigned_to_id.eq(person_id).or(spawned_by_them)),
        )
        .execute(self.conn)?;
        // Shared one-time rewards they redeemed stay pending for fulfillment.
        diesel::update(rewards::table.filter(rewards::redeemed_by_id.eq(person_id)))
            .set(rewards::redeemed_by_id.eq(None::<i32>))
            .execute(self.conn)?;
        diesel::delete(sessions::table.filter(sessions::person_id.eq(person_id)))
            .execute(self.conn)?;
        diesel::delete(persons::table.filter(persons::id.eq(person_id))).execute(self.conn)?;
        Ok(())
    }

    fn mark_chore_completed(
        &mut self,
        chore_id: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        use schema::chores::dsl::*;
        diesel::update(chores.filter(id.eq(chore_id)))
            .set((
                completed.eq(true),
                date_completed.eq(Some(at)),
                updated_at.eq(at),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn soft_delete_chore(&mut self, chore_id: i32, at: NaiveDateTime) -> Result<(), StorageError> {
        use schema::chores::dsl::*;
        diesel::update(chores.filter(id.eq(chore_id)))
            .set((deleted.eq(true), updated_at.eq(at)))
            .execute(self.conn)?;
        Ok(())
    }

    fn delete_chore(&mut self, chore_id: i32) -> Result<(), StorageError> {
        use schema::chores::dsl::*;
        diesel::delete(chores.filter(id.eq(chore_id))).execute(self.conn)?;
        Ok(())
    }

    fn reset_daily_chores(&mut self, at: NaiveDateTime) -> Result<usize, StorageError> {
        use schema::{chores, persons};
        let n = diesel::update(
            chores::table
                .filter(chores::is_daily.eq(true))
                .filter(chores::deleted.eq(false)),
        )
        .set((
            chores::completed.eq(false),
            chores::date_completed.eq(None::<NaiveDateTime>),
            chores::updated_at.eq(at),
        ))
        .execute(self.conn)?;
        diesel::update(persons::table)
            .set(persons::last_daily_chores_added.eq(at))
            .execute(self.conn)?;
        Ok(n)
    }

    fn mark_reward_redeemed(
        &mut self,
        reward_id: i32,
        by_person: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        use schema::rewards::dsl::*;
        diesel::update(rewards.filter(id.eq(reward_id)))
            .set((
                completed.eq(true),
                date_completed.eq(Some(at)),
                redeemed_by_id.eq(Some(by_person)),
                redeemed_at.eq(Some(at)),
                updated_at.eq(at),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn insert_redemption(&mut self, row: NewRedemption) -> Result<Reward, StorageError> {
        use schema::rewards;
        Ok(diesel::insert_into(rewards::table)
            .values(&row)
            .returning(Reward::as_returning())
            .get_result(self.conn)?)
    }

    fn mark_reward_fulfilled(
        &mut self,
        reward_id: i32,
        at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        use schema::rewards::dsl::*;
        diesel::update(rewards.filter(id.eq(reward_id)))
            .set((
                fulfilled.eq(true),
                fulfilled_at.eq(Some(at)),
                updated_at.eq(at),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn delete_reward(&mut self, reward_id: i32) -> Result<(), StorageError> {
        use schema::rewards::dsl::*;
        diesel::delete(rewards.filter(id.eq(reward_id))).execute(self.conn)?;
        Ok(())
    }

    fn append_activity(&mut self, entry: NewActivity) -> Result<(), StorageError> {
        use schema::activity_log;
        diesel::insert_into(activity_log::table)
            .values(&entry)
            .execute(self.conn)?;
        Ok(())
    }
}

/// Attaches owner and redeemer display names, resolved with one extra query.
fn with_person_names(
    conn: &mut SqliteConnection,
    rows: Vec<Reward>,
) -> Result<Vec<RewardRow>, StorageError> {
    use schema::persons;
    let mut ids: Vec<i32> = rows
        .iter()
        .flat_map(|r| [r.assigned_to_id, r.redeemed_by_id])
        .flatten()
        .collect();
    ids.sort_unstable();
    ids.dedup();
    let names: HashMap<i32, String> = if ids.is_empty() {
        HashMap::new()
    } else {
        persons::table
            .filter(persons::id.eq_any(&ids))
            .select((persons::id, persons::name))
            .load::<(i32, String)>(conn)?
            .into_iter()
            .collect()
    };
    Ok(rows
        .into_iter()
        .map(|r| {
            let owner = r.assigned_to_id.and_then(|i| names.get(&i).cloned());
            let redeemer = r.redeemed_by_id.and_then(|i| names.get(&i).cloned());
            (r, owner, redeemer)
        })
        .collect())
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Busy timeout first so the remaining pragmas wait on a held lock
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}

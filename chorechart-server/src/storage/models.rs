use crate::storage::schema::{activity_log, app_settings, chores, persons, rewards, sessions};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = persons)]
pub struct Person {
    pub id: i32,
    pub name: String,
    pub points: i32,
    pub bonus_points: i32,
    pub last_reset: NaiveDateTime,
    pub last_daily_chores_added: NaiveDateTime,
    pub avatar: String,
    pub color: String,
    pub order_index: i32,
    pub pin_hash: Option<String>,
    pub is_admin: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = persons)]
pub struct NewPerson<'a> {
    pub name: &'a str,
    pub avatar: &'a str,
    pub color: &'a str,
    pub order_index: i32,
    pub pin_hash: Option<&'a str>,
    pub is_admin: bool,
}

/// `None` fields are left untouched.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = persons)]
pub struct PersonChanges {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub color: Option<String>,
    pub order_index: Option<i32>,
    pub pin_hash: Option<String>,
    pub is_admin: Option<bool>,
}

impl PersonChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.avatar.is_none()
            && self.color.is_none()
            && self.order_index.is_none()
            && self.pin_hash.is_none()
            && self.is_admin.is_none()
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = chores)]
pub struct Chore {
    pub id: i32,
    pub title: String,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub points: i32,
    pub completed: bool,
    pub date_completed: Option<NaiveDateTime>,
    pub is_daily: bool,
    pub due_date: Option<NaiveDate>,
    pub deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = chores)]
pub struct NewChore<'a> {
    pub title: &'a str,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<&'a str>,
    pub points: i32,
    pub is_daily: bool,
    pub due_date: Option<NaiveDate>,
}

/// Completion and deletion flags are not part of the changeset; the ledger owns them.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = chores)]
pub struct ChoreChanges {
    pub title: Option<String>,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub points: Option<i32>,
    pub is_daily: Option<bool>,
    pub due_date: Option<NaiveDate>,
}

impl ChoreChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.assigned_to_id.is_none()
            && self.assigned_to.is_none()
            && self.points.is_none()
            && self.is_daily.is_none()
            && self.due_date.is_none()
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = rewards)]
pub struct Reward {
    pub id: i32,
    pub title: String,
    pub points_required: i32,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub completed: bool,
    pub date_completed: Option<NaiveDateTime>,
    pub redeemed_by_id: Option<i32>,
    pub redeemed_at: Option<NaiveDateTime>,
    pub fulfilled: bool,
    pub fulfilled_at: Option<NaiveDateTime>,
    pub is_one_time: bool,
    /// Set on rows spawned by redeeming a recurring reward.
    pub is_redemption: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = rewards)]
pub struct NewReward<'a> {
    pub title: &'a str,
    pub points_required: i32,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<&'a str>,
    pub is_one_time: bool,
}

/// Row written for one redemption of a recurring reward.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = rewards)]
pub struct NewRedemption {
    pub title: String,
    pub points_required: i32,
    pub completed: bool,
    pub date_completed: Option<NaiveDateTime>,
    pub redeemed_by_id: Option<i32>,
    pub redeemed_at: Option<NaiveDateTime>,
    pub is_one_time: bool,
    pub is_redemption: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = activity_log)]
pub struct Activity {
    pub id: i32,
    pub date: NaiveDateTime,
    pub kind: String,
    pub description: String,
    pub user_name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = activity_log)]
pub struct NewActivity {
    pub date: NaiveDateTime,
    pub kind: String,
    pub description: String,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = app_settings)]
pub struct AppSetting {
    pub id: i32,
    pub key: String,
    pub value: String,
}

#[derive(Insertable)]
#[diesel(table_name = app_settings)]
pub struct NewAppSetting<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub person_id: i32,
}

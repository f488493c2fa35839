use serde::{Deserialize, Serialize};

pub mod endpoints;

pub const API_V1_PREFIX: &str = "/api/v1";
pub const HEALTH_PATH: &str = "/api/health";

// Health
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub timestamp: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResp {
    pub success: bool,
    pub message: String,
}

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginReq {
    pub pin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUserDto {
    pub id: i32,
    pub name: String,
    pub is_admin: bool,
    pub is_master: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResp {
    pub success: bool,
    pub token: String,
    pub user: AuthUserDto,
}

// Setup wizard
#[derive(Debug, Serialize, Deserialize)]
pub struct SetupStatusDto {
    pub setup_needed: bool,
    pub master_pin_set: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetupPersonReq {
    pub name: String,
    pub pin: Option<String>,
    #[serde(default, alias = "isAdmin")]
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetupCompleteReq {
    #[serde(alias = "masterPin")]
    pub master_pin: String,
    #[serde(default)]
    pub people: Vec<SetupPersonReq>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyMasterReq {
    pub pin: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyMasterResp {
    pub valid: bool,
}

// Persons
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonDto {
    pub id: i32,
    pub name: String,
    pub points: i32,
    pub bonus_points: i32,
    pub last_reset: String,
    pub last_daily_chores_added: String,
    pub avatar: String,
    pub color: String,
    pub order_index: i32,
    pub has_pin: bool,
    pub is_admin: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreatePersonReq {
    pub name: String,
    pub avatar: Option<String>,
    pub color: Option<String>,
    pub pin: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdatePersonReq {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub color: Option<String>,
    pub pin: Option<String>,
    pub is_admin: Option<bool>,
    pub order_index: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BonusPointsReq {
    pub points: i32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResetPointsReq {
    #[serde(default)]
    pub points: i32,
}

// Chores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoreDto {
    pub id: i32,
    pub title: String,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub person_name: Option<String>,
    pub points: i32,
    pub completed: bool,
    pub date_completed: Option<String>,
    pub is_daily: bool,
    pub due_date: Option<String>, // YYYY-MM-DD
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateChoreReq {
    pub title: String,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub points: Option<i32>,
    pub is_daily: Option<bool>,
    pub due_date: Option<String>,
}

/// Completion state is deliberately absent: chores are completed only through
/// the complete endpoint.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateChoreReq {
    pub title: Option<String>,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub points: Option<i32>,
    pub is_daily: Option<bool>,
    pub due_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetDailyResp {
    pub reset: usize,
}

// Rewards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardDto {
    pub id: i32,
    pub title: String,
    pub points_required: i32,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub person_name: Option<String>,
    pub completed: bool,
    pub date_completed: Option<String>,
    pub redeemed_by_id: Option<i32>,
    pub redeemed_by_name: Option<String>,
    pub redeemed_at: Option<String>,
    pub fulfilled: bool,
    pub fulfilled_at: Option<String>,
    pub is_one_time: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateRewardReq {
    pub title: String,
    pub points_required: i32,
    pub assigned_to_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub is_one_time: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemResp {
    pub reward: RewardDto,
    pub new_balance: i32,
}

// Activity log
#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityDto {
    pub id: i32,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub user_name: Option<String>,
    pub created_at: String,
}

// Settings
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingDto {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingUpdateReq {
    pub value: String,
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Person id carried by tokens issued for the master PIN. No person row uses it.
pub const MASTER_PERSON_ID: i32 = 0;

/// Display name of the master identity.
pub const MASTER_NAME: &str = "Admin";

/// Appended to the title of a reward row spawned by redeeming a recurring reward.
pub const REDEEMED_SUFFIX: &str = " (Redeemed)";

/// Settings key holding the bcrypt hash of the master PIN.
pub const MASTER_PIN_KEY: &str = "master_pin";

/// Tag stored in `activity_log.type`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ChoreCompleted,
    ChoreDeleted,
    DailyChoresReset,
    RewardRedeemed,
    RewardFulfilled,
    RewardDeleted,
    BonusAwarded,
    PointsReset,
    PersonDeleted,
    SetupComplete,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::ChoreCompleted => "chore_completed",
            ActivityKind::ChoreDeleted => "chore_deleted",
            ActivityKind::DailyChoresReset => "daily_chores_reset",
            ActivityKind::RewardRedeemed => "reward_redeemed",
            ActivityKind::RewardFulfilled => "reward_fulfilled",
            ActivityKind::RewardDeleted => "reward_deleted",
            ActivityKind::BonusAwarded => "bonus_awarded",
            ActivityKind::PointsReset => "points_reset",
            ActivityKind::PersonDeleted => "person_deleted",
            ActivityKind::SetupComplete => "setup_complete",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown activity type: {0}")]
pub struct UnknownActivityKind(pub String);

impl FromStr for ActivityKind {
    type Err = UnknownActivityKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "chore_completed" => ActivityKind::ChoreCompleted,
            "chore_deleted" => ActivityKind::ChoreDeleted,
            "daily_chores_reset" => ActivityKind::DailyChoresReset,
            "reward_redeemed" => ActivityKind::RewardRedeemed,
            "reward_fulfilled" => ActivityKind::RewardFulfilled,
            "reward_deleted" => ActivityKind::RewardDeleted,
            "bonus_awarded" => ActivityKind::BonusAwarded,
            "points_reset" => ActivityKind::PointsReset,
            "person_deleted" => ActivityKind::PersonDeleted,
            "setup_complete" => ActivityKind::SetupComplete,
            other => return Err(UnknownActivityKind(other.to_string())),
        };
        Ok(kind)
    }
}

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_V1_PREFIX, HEALTH_PATH};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn v1(base: &str, suffix: &str) -> String {
    base_join(base, &format!("{}/{}", API_V1_PREFIX, suffix))
}

pub fn health(base: &str) -> String {
    base_join(base, HEALTH_PATH)
}

pub fn setup_status(base: &str) -> String {
    v1(base, "setup/status")
}
pub fn setup_complete(base: &str) -> String {
    v1(base, "setup/complete")
}
pub fn setup_verify_master(base: &str) -> String {
    v1(base, "setup/verify-master")
}

pub fn auth_login(base: &str) -> String {
    v1(base, "auth/login")
}
pub fn auth_logout(base: &str) -> String {
    v1(base, "auth/logout")
}
pub fn auth_me(base: &str) -> String {
    v1(base, "auth/me")
}

pub fn persons(base: &str) -> String {
    v1(base, "persons")
}
pub fn person(base: &str, id: i32) -> String {
    v1(base, &format!("persons/{}", id))
}
pub fn person_bonus_points(base: &str, id: i32) -> String {
    v1(base, &format!("persons/{}/bonus-points", id))
}
pub fn person_reset_points(base: &str, id: i32) -> String {
    v1(base, &format!("persons/{}/reset-points", id))
}

pub fn chores(base: &str) -> String {
    v1(base, "chores")
}
pub fn chore(base: &str, id: i32) -> String {
    v1(base, &format!("chores/{}", id))
}
pub fn chore_complete(base: &str, id: i32) -> String {
    v1(base, &format!("chores/{}/complete", id))
}
pub fn chores_reset_daily(base: &str) -> String {
    v1(base, "chores/reset-daily")
}

pub fn rewards(base: &str) -> String {
    v1(base, "rewards")
}
pub fn reward(base: &str, id: i32) -> String {
    v1(base, &format!("rewards/{}", id))
}
pub fn reward_redeem(base: &str, id: i32) -> String {
    v1(base, &format!("rewards/{}/complete", id))
}
pub fn reward_fulfill(base: &str, id: i32) -> String {
    v1(base, &format!("rewards/{}/fulfill", id))
}
pub fn rewards_pending(base: &str) -> String {
    v1(base, "rewards/pending-redemptions")
}

pub fn activities(base: &str) -> String {
    v1(base, "activities")
}

pub fn settings(base: &str) -> String {
    v1(base, "settings")
}
pub fn setting(base: &str, key: &str) -> String {
    v1(base, &format!("settings/{}", enc(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_double_slashes() {
        assert_eq!(
            chore_complete("http://h:1/", 4),
            "http://h:1/api/v1/chores/4/complete"
        );
        assert_eq!(health("http://h:1"), "http://h:1/api/health");
    }

    #[test]
    fn setting_keys_are_encoded() {
        assert_eq!(
            setting("http://h", "theme color"),
            "http://h/api/v1/settings/theme%20color"
        );
    }
}

use super::{AppError, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::OriginalUri,
    http::{Method, Request},
    middleware::Next,
};
use chorechart_shared::domain::MASTER_PIN_KEY;
use percent_encoding::percent_decode_str;

pub async fn enforce_acl(req: Request<axum::body::Body>, next: Next) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let actor = &auth.actor;

    let segs = segmented(&path);
    let prefix = ["api", "v1"];
    if !segs.as_slice().starts_with(&prefix) {
        tracing::warn!(?segs, "ACL: path outside API scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[prefix.len()..];

    let decision = if actor.is_admin || actor.is_master {
        allow_admin(&method, rest)
    } else {
        allow_member(&method, rest)
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            person_id = actor.person_id,
            person_name = %actor.name,
            is_admin = actor.is_admin,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

fn allow_admin(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    if allow_member(method, rest).is_ok() {
        return Ok(());
    }
    match rest {
        ["persons"] if *method == Method::POST => Ok(()),
        ["persons", id] if is_write(method) && is_id(id) => Ok(()),
        ["persons", id, "bonus-points" | "reset-points"] if *method == Method::POST && is_id(id) => {
            Ok(())
        }
        ["chores"] if *method == Method::POST => Ok(()),
        ["chores", "reset-daily"] if *method == Method::POST => Ok(()),
        ["chores", id] if is_write(method) && is_id(id) => Ok(()),
        ["rewards"] if *method == Method::POST => Ok(()),
        ["rewards", "pending-redemptions"] if *method == Method::GET => Ok(()),
        ["rewards", id] if *method == Method::DELETE && is_id(id) => Ok(()),
        ["rewards", id, "fulfill"] if *method == Method::POST && is_id(id) => Ok(()),
        ["settings", key] if *method == Method::GET || *method == Method::PUT => {
            ensure_public_setting(key)
        }
        _ => Err(AppError::forbidden()),
    }
}

fn allow_member(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["auth", "logout"] if *method == Method::POST => Ok(()),
        ["auth", "me"] if *method == Method::GET => Ok(()),
        ["persons"] if *method == Method::GET => Ok(()),
        ["persons", id] if *method == Method::GET && is_id(id) => Ok(()),
        ["chores"] if *method == Method::GET => Ok(()),
        ["chores", id] if *method == Method::GET && is_id(id) => Ok(()),
        // ownership is checked by the ledger
        ["chores", id, "complete"] if *method == Method::POST && is_id(id) => Ok(()),
        ["rewards"] if *method == Method::GET => Ok(()),
        ["rewards", id, "complete"] if *method == Method::POST && is_id(id) => Ok(()),
        ["activities"] if *method == Method::GET => Ok(()),
        ["settings"] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_id(seg: &str) -> bool {
    seg.parse::<i32>().is_ok()
}

fn is_write(method: &Method) -> bool {
    *method == Method::PUT || *method == Method::DELETE
}

fn ensure_public_setting(seg: &str) -> Result<(), AppError> {
    let key = percent_decode_str(seg).decode_utf8_lossy();
    if key == MASTER_PIN_KEY {
        Err(AppError::forbidden())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<&str> {
        segmented(path)
    }

    #[test]
    fn members_read_and_act_on_their_own_items() {
        for (m, p) in [
            (Method::GET, "persons"),
            (Method::GET, "persons/3"),
            (Method::GET, "chores"),
            (Method::GET, "chores/7"),
            (Method::POST, "chores/7/complete"),
            (Method::GET, "rewards"),
            (Method::POST, "rewards/2/complete"),
            (Method::GET, "activities"),
            (Method::GET, "settings"),
            (Method::GET, "auth/me"),
            (Method::POST, "auth/logout"),
        ] {
            assert!(allow_member(&m, &segs(p)).is_ok(), "{m} {p}");
        }
    }

    #[test]
    fn members_cannot_manage() {
        for (m, p) in [
            (Method::POST, "persons"),
            (Method::PUT, "persons/3"),
            (Method::DELETE, "persons/3"),
            (Method::POST, "persons/3/bonus-points"),
            (Method::POST, "persons/3/reset-points"),
            (Method::POST, "chores"),
            (Method::PUT, "chores/1"),
            (Method::DELETE, "chores/1"),
            (Method::POST, "chores/reset-daily"),
            (Method::POST, "rewards"),
            (Method::DELETE, "rewards/1"),
            (Method::POST, "rewards/1/fulfill"),
            (Method::GET, "rewards/pending-redemptions"),
            (Method::GET, "settings/theme"),
            (Method::PUT, "settings/theme"),
        ] {
            assert!(allow_member(&m, &segs(p)).is_err(), "{m} {p}");
        }
    }

    #[test]
    fn admins_manage_everything() {
        for (m, p) in [
            (Method::GET, "chores"),
            (Method::POST, "persons"),
            (Method::PUT, "persons/3"),
            (Method::DELETE, "persons/3"),
            (Method::POST, "persons/3/bonus-points"),
            (Method::POST, "persons/3/reset-points"),
            (Method::POST, "chores"),
            (Method::PUT, "chores/1"),
            (Method::DELETE, "chores/1"),
            (Method::POST, "chores/reset-daily"),
            (Method::POST, "rewards"),
            (Method::DELETE, "rewards/1"),
            (Method::POST, "rewards/1/fulfill"),
            (Method::GET, "rewards/pending-redemptions"),
            (Method::GET, "settings/theme"),
            (Method::PUT, "settings/theme"),
        ] {
            assert!(allow_admin(&m, &segs(p)).is_ok(), "{m} {p}");
        }
    }

    #[test]
    fn master_pin_setting_is_never_reachable() {
        assert!(allow_admin(&Method::GET, &segs("settings/master_pin")).is_err());
        assert!(allow_admin(&Method::PUT, &segs("settings/master_pin")).is_err());
        assert!(allow_admin(&Method::PUT, &segs("settings/master%5Fpin")).is_err());
    }

    #[test]
    fn malformed_ids_are_denied() {
        assert!(allow_admin(&Method::DELETE, &segs("persons/abc")).is_err());
        assert!(allow_member(&Method::POST, &segs("chores/x/complete")).is_err());
        assert!(allow_admin(&Method::PATCH, &segs("chores/1")).is_err());
    }
}

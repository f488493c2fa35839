use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chorechart_shared::domain::MASTER_PERSON_ID;
use chorechart_shared::jwt::{self, JwtClaims};
use chrono::{Duration, Utc};
use tracing::{error, warn};

use super::{AppError, AppState};
use crate::ledger::Actor;

/// Identity attached to every authenticated request.
#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub actor: Actor,
    pub jti: String,
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let header_str = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(AppError::unauthorized)?
        .to_str()
        .map_err(|_| AppError::unauthorized())?;
    let token = header_str
        .strip_prefix("Bearer ")
        .ok_or_else(AppError::unauthorized)?;

    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error=%e, "auth: jwt decode failed");
            return Err(AppError::unauthorized());
        }
    };

    let cutoff = Utc::now() - Duration::days(state.config.session_idle_days);
    match state
        .store
        .touch_session_with_cutoff(&claims.jti, cutoff.naive_utc())
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                jti = %claims.jti,
                person_id = claims.person_id,
                cutoff = %cutoff,
                "auth: session missing or expired (last_used_at < cutoff)"
            );
            return Err(AppError::unauthorized());
        }
        Err(e) => {
            error!(jti = %claims.jti, error=%e, "auth: touch_session_with_cutoff failed");
            return Err(AppError::internal(e));
        }
    }

    let actor = resolve_actor(&state, &claims).await?;
    req.extensions_mut().insert(AuthCtx {
        actor,
        jti: claims.jti,
    });
    Ok(next.run(req).await)
}

/// Role and name come from the person row, not from the token.
async fn resolve_actor(state: &AppState, claims: &JwtClaims) -> Result<Actor, AppError> {
    if claims.is_master && claims.person_id == MASTER_PERSON_ID {
        return Ok(Actor::master(&claims.name));
    }
    let person = state
        .store
        .get_person(claims.person_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| {
            warn!(person_id = claims.person_id, "auth: token for deleted person");
            AppError::unauthorized()
        })?;
    Ok(Actor {
        person_id: person.id,
        name: person.name,
        is_admin: person.is_admin,
        is_master: false,
    })
}

pub async fn issue_token(state: &AppState, actor: &Actor) -> Result<String, AppError> {
    let jti = uuid::Uuid::new_v4().to_string();
    let exp = (Utc::now() + Duration::hours(state.config.token_ttl_hours)).timestamp();
    let sub = if actor.is_master {
        "master".to_string()
    } else {
        format!("person:{}", actor.person_id)
    };
    let claims = JwtClaims {
        sub,
        jti: jti.clone(),
        exp,
        person_id: actor.person_id,
        name: actor.name.clone(),
        is_admin: actor.is_admin,
        is_master: actor.is_master,
    };

    state
        .store
        .create_session(&jti, actor.person_id)
        .await
        .map_err(|e| {
            error!(person_id = actor.person_id, error=%e, "login: create_session failed");
            AppError::internal(e)
        })?;
    let token = jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(person_id = actor.person_id, error=%e, "login: jwt encode failed");
        AppError::internal(e)
    })?;
    Ok(token)
}

// bcrypt is CPU bound; keep it off the async workers.

pub async fn hash_pin(pin: &str, cost: u32) -> Result<String, AppError> {
    let pin = pin.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(pin, cost))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)
}

pub async fn verify_pin(pin: &str, hash: &str) -> Result<bool, AppError> {
    let pin = pin.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(pin, &hash))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)
}

/// Person id of the first candidate whose hash matches `pin`.
/// Unparseable hashes are skipped.
pub async fn first_matching_pin(
    pin: &str,
    candidates: Vec<(i32, String)>,
) -> Result<Option<i32>, AppError> {
    let pin = pin.to_string();
    tokio::task::spawn_blocking(move || {
        candidates.into_iter().find_map(|(id, hash)| match bcrypt::verify(&pin, &hash) {
            Ok(true) => Some(id),
            Ok(false) => None,
            Err(e) => {
                warn!(person_id = id, error=%e, "login: stored PIN hash unreadable");
                None
            }
        })
    })
    .await
    .map_err(AppError::internal)
}

mod acl;
pub mod auth;
mod config;
mod handlers;

use crate::ledger::{Actor, Ledger, LedgerError};
use crate::server::auth::AuthCtx;
use crate::storage::models::{Activity, NewActivity, Person};
use crate::storage::{ChoreRow, PersonInput, RewardRow, StorageError, Store};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, State},
    http::{Method, StatusCode, header},
    routing::{delete, get, post},
};
use chorechart_shared::api;
use chorechart_shared::domain::{ActivityKind, MASTER_NAME, MASTER_PIN_KEY};
use chrono::{NaiveDateTime, Utc};
pub use config::{AppConfig, ConfigError, DEFAULT_PORT};
use serde::Serialize;
use tower_http::services::ServeDir;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    pub ledger: Ledger<Store>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        Self {
            config,
            ledger: Ledger::new(store.clone()),
            store,
        }
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route(&v1("/auth/logout"), post(api_auth_logout))
        .route(&v1("/auth/me"), get(api_auth_me))
        .route(
            &v1("/persons"),
            get(handlers::list_persons).post(handlers::create_person),
        )
        .route(
            &v1("/persons/{id}"),
            get(handlers::get_person)
                .put(handlers::update_person)
                .delete(handlers::delete_person),
        )
        .route(&v1("/persons/{id}/bonus-points"), post(handlers::bonus_points))
        .route(&v1("/persons/{id}/reset-points"), post(handlers::reset_points))
        .route(
            &v1("/chores"),
            get(handlers::list_chores).post(handlers::create_chore),
        )
        .route(&v1("/chores/reset-daily"), post(handlers::reset_daily_chores))
        .route(
            &v1("/chores/{id}"),
            get(handlers::get_chore)
                .put(handlers::update_chore)
                .delete(handlers::delete_chore),
        )
        .route(&v1("/chores/{id}/complete"), post(handlers::complete_chore))
        .route(
            &v1("/rewards"),
            get(handlers::list_rewards).post(handlers::create_reward),
        )
        .route(
            &v1("/rewards/pending-redemptions"),
            get(handlers::pending_redemptions),
        )
        .route(&v1("/rewards/{id}"), delete(handlers::delete_reward))
        .route(&v1("/rewards/{id}/complete"), post(handlers::redeem_reward))
        .route(&v1("/rewards/{id}/fulfill"), post(handlers::fulfill_reward))
        .route(&v1("/activities"), get(handlers::list_activities))
        .route(&v1("/settings"), get(handlers::list_settings))
        .route(
            &v1("/settings/{key}"),
            get(handlers::get_setting).put(handlers::put_setting),
        )
        .with_state(state.clone())
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn(acl::enforce_acl))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            person_id = tracing::field::Empty,
            person_name = tracing::field::Empty,
            is_admin = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route(api::HEALTH_PATH, get(health))
        .route(&v1("/setup/status"), get(api_setup_status))
        .route(&v1("/setup/complete"), post(api_setup_complete))
        .route(&v1("/setup/verify-master"), post(api_verify_master))
        .route(&v1("/auth/login"), post(api_auth_login))
        .merge(private)
        .nest_service("/uploads", ServeDir::new(&state.config.uploads_dir))
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured
    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

fn v1(path: &str) -> String {
    format!("{}{}", api::API_V1_PREFIX, path)
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let is_api = req.uri().path().starts_with("/api/");
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    // HSTS is only honored on HTTPS; harmless otherwise
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    if is_api {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            HeaderName::from_static("expires"),
            HeaderValue::from_static("0"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("person_id", auth.actor.person_id);
        span.record("person_name", tracing::field::display(&auth.actor.name));
        span.record("is_admin", auth.actor.is_admin);
    }
    Ok(next.run(req).await)
}

async fn health() -> Json<api::HealthDto> {
    Json(api::HealthDto {
        status: "ok".into(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// Setup wizard

async fn api_setup_status(
    State(state): State<AppState>,
) -> Result<Json<api::SetupStatusDto>, AppError> {
    let master_pin_set = state
        .store
        .get_setting(MASTER_PIN_KEY)
        .await?
        .is_some();
    Ok(Json(api::SetupStatusDto {
        setup_needed: !master_pin_set,
        master_pin_set,
    }))
}

async fn api_setup_complete(
    State(state): State<AppState>,
    Json(body): Json<api::SetupCompleteReq>,
) -> Result<Json<api::SuccessResp>, AppError> {
    let master_pin = body.master_pin.trim();
    if master_pin.is_empty() {
        return Err(AppError::bad_request("Master PIN is required"));
    }
    let named: Vec<&api::SetupPersonReq> = body
        .people
        .iter()
        .filter(|p| !p.name.trim().is_empty())
        .collect();
    if named.is_empty() {
        return Err(AppError::bad_request("At least one person is required"));
    }
    // cheap pre-check; the transaction re-checks
    if state.store.get_setting(MASTER_PIN_KEY).await?.is_some() {
        return Err(AppError::conflict("Setup already completed"));
    }

    let cost = state.config.pin_hash_cost;
    let master_hash = auth::hash_pin(master_pin, cost).await?;
    let mut people = Vec::with_capacity(named.len());
    for (idx, p) in named.into_iter().enumerate() {
        let pin_hash = match p.pin.as_deref().map(str::trim) {
            Some(pin) if !pin.is_empty() => Some(auth::hash_pin(pin, cost).await?),
            _ => None,
        };
        people.push(PersonInput {
            name: p.name.trim().to_string(),
            avatar: DEFAULT_AVATAR.to_string(),
            color: DEFAULT_COLOR.to_string(),
            order_index: idx as i32,
            pin_hash,
            is_admin: p.is_admin,
        });
    }
    let entry = NewActivity {
        date: Utc::now().naive_utc(),
        kind: ActivityKind::SetupComplete.as_str().to_string(),
        description: format!("Initial setup completed with {} people", people.len()),
        user_name: Some("System".to_string()),
    };

    match state
        .store
        .complete_setup(&master_hash, people, entry)
        .await?
    {
        Some(n) => {
            tracing::info!(people = n, "setup: completed");
            Ok(Json(api::SuccessResp {
                success: true,
                message: "Setup completed successfully".into(),
            }))
        }
        None => Err(AppError::conflict("Setup already completed")),
    }
}

async fn api_verify_master(
    State(state): State<AppState>,
    Json(body): Json<api::VerifyMasterReq>,
) -> Result<Json<api::VerifyMasterResp>, AppError> {
    let hash = state
        .store
        .get_setting(MASTER_PIN_KEY)
        .await?
        .ok_or_else(|| AppError::bad_request("Master PIN not set"))?;
    let valid = auth::verify_pin(body.pin.trim(), &hash).await?;
    Ok(Json(api::VerifyMasterResp { valid }))
}

// Auth

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::LoginReq>,
) -> Result<Json<api::LoginResp>, AppError> {
    let pin = body.pin.trim();
    if pin.is_empty() {
        return Err(AppError::bad_request("PIN is required"));
    }

    let mut actor = None;
    if let Some(hash) = state.store.get_setting(MASTER_PIN_KEY).await?
        && auth::verify_pin(pin, &hash).await?
    {
        actor = Some(Actor::master(MASTER_NAME));
    }
    if actor.is_none() {
        let persons = state.store.list_persons_with_pin().await?;
        let candidates = persons
            .iter()
            .filter_map(|p| p.pin_hash.clone().map(|h| (p.id, h)))
            .collect();
        if let Some(id) = auth::first_matching_pin(pin, candidates).await? {
            actor = persons.into_iter().find(|p| p.id == id).map(|p| Actor {
                person_id: p.id,
                name: p.name,
                is_admin: p.is_admin,
                is_master: false,
            });
        }
    }
    let Some(actor) = actor else {
        tracing::warn!("login: no identity matches the PIN");
        return Err(AppError::unauthorized());
    };

    let token = auth::issue_token(&state, &actor).await?;
    tracing::info!(person_id = actor.person_id, person_name = %actor.name, "login: token issued");
    Ok(Json(api::LoginResp {
        success: true,
        token,
        user: auth_user_dto(&actor),
    }))
}

async fn api_auth_logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::SuccessResp>, AppError> {
    state.store.delete_session(&auth.jti).await?;
    Ok(Json(api::SuccessResp {
        success: true,
        message: "Logged out".into(),
    }))
}

async fn api_auth_me(Extension(auth): Extension<AuthCtx>) -> Json<api::AuthUserDto> {
    Json(auth_user_dto(&auth.actor))
}

// DTO conversions

const DEFAULT_AVATAR: &str = "default_avatar.png";
const DEFAULT_COLOR: &str = "#ffffff";

fn ts(dt: NaiveDateTime) -> String {
    chrono::DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

fn auth_user_dto(actor: &Actor) -> api::AuthUserDto {
    api::AuthUserDto {
        id: actor.person_id,
        name: actor.name.clone(),
        is_admin: actor.is_admin,
        is_master: actor.is_master,
    }
}

fn person_dto(p: Person) -> api::PersonDto {
    api::PersonDto {
        id: p.id,
        name: p.name,
        points: p.points,
        bonus_points: p.bonus_points,
        last_reset: ts(p.last_reset),
        last_daily_chores_added: ts(p.last_daily_chores_added),
        avatar: p.avatar,
        color: p.color,
        order_index: p.order_index,
        has_pin: p.pin_hash.is_some(),
        is_admin: p.is_admin,
        created_at: ts(p.created_at),
        updated_at: ts(p.updated_at),
    }
}

fn chore_dto((c, person_name): ChoreRow) -> api::ChoreDto {
    api::ChoreDto {
        id: c.id,
        title: c.title,
        assigned_to_id: c.assigned_to_id,
        assigned_to: c.assigned_to,
        person_name,
        points: c.points,
        completed: c.completed,
        date_completed: c.date_completed.map(ts),
        is_daily: c.is_daily,
        due_date: c.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
        deleted: c.deleted,
        created_at: ts(c.created_at),
        updated_at: ts(c.updated_at),
    }
}

fn reward_dto((r, person_name, redeemed_by_name): RewardRow) -> api::RewardDto {
    api::RewardDto {
        id: r.id,
        title: r.title,
        points_required: r.points_required,
        assigned_to_id: r.assigned_to_id,
        assigned_to: r.assigned_to,
        person_name,
        completed: r.completed,
        date_completed: r.date_completed.map(ts),
        redeemed_by_id: r.redeemed_by_id,
        redeemed_by_name,
        redeemed_at: r.redeemed_at.map(ts),
        fulfilled: r.fulfilled,
        fulfilled_at: r.fulfilled_at.map(ts),
        is_one_time: r.is_one_time,
        created_at: ts(r.created_at),
        updated_at: ts(r.updated_at),
    }
}

fn activity_dto(a: Activity) -> api::ActivityDto {
    api::ActivityDto {
        id: a.id,
        date: ts(a.date),
        kind: a.kind,
        description: a.description,
        user_name: a.user_name,
        created_at: ts(a.created_at),
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    /// A ledger rule rejected the request.
    Rejected {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn conflict<T: Into<String>>(msg: T) -> Self {
        Self::Conflict(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::InvalidInput(m) => AppError::BadRequest(m),
            other => AppError::internal(other),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(value: LedgerError) -> Self {
        let (status, code) = match &value {
            LedgerError::NotFound(what) => {
                return AppError::not_found(format!("{} not found", capitalize(what)));
            }
            LedgerError::Storage(_) => return AppError::internal(&value),
            LedgerError::AlreadyCompleted => (StatusCode::CONFLICT, "already_completed"),
            LedgerError::AlreadyRedeemed => (StatusCode::CONFLICT, "already_redeemed"),
            LedgerError::AlreadyFulfilled => (StatusCode::CONFLICT, "already_fulfilled"),
            LedgerError::NotRedeemedYet => (StatusCode::CONFLICT, "not_redeemed_yet"),
            LedgerError::NotAuthorized(_) => (StatusCode::FORBIDDEN, "not_authorized"),
            LedgerError::NotEligible => (StatusCode::FORBIDDEN, "not_eligible"),
            LedgerError::InsufficientPoints { .. } => {
                (StatusCode::BAD_REQUEST, "insufficient_points")
            }
            LedgerError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
        };
        AppError::Rejected {
            status,
            code,
            message: value.to_string(),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, code, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            AppError::Rejected {
                status,
                code,
                message,
            } => (status, message, code, None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, code, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::warn!(status = %status, code, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorBody { error: msg, code });
        (status, body).into_response()
    }
}

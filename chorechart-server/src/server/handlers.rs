//! Resource handlers behind the bearer and ACL layers.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use chorechart_shared::api;
use chorechart_shared::domain::MASTER_PIN_KEY;
use chrono::NaiveDate;
use serde::Deserialize;

use super::auth::{self, AuthCtx};
use super::{
    AppError, AppState, DEFAULT_AVATAR, DEFAULT_COLOR, activity_dto, chore_dto, person_dto,
    reward_dto,
};
use crate::ledger::ChoreRemoval;
use crate::storage::models::{ChoreChanges, PersonChanges};
use crate::storage::{ChoreInput, PersonInput, RewardInput, RowFilter};

fn success(message: impl Into<String>) -> Json<api::SuccessResp> {
    Json(api::SuccessResp {
        success: true,
        message: message.into(),
    })
}

fn required_text(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Empty strings clear the date.
fn parse_due_date(raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::bad_request(format!("invalid due_date: {s}"))),
    }
}

/// Resolves an assignment; returns the person's name for the free-text column.
async fn assignee_name(state: &AppState, person_id: Option<i32>) -> Result<Option<String>, AppError> {
    let Some(id) = person_id else {
        return Ok(None);
    };
    let person = state
        .store
        .get_person(id)
        .await?
        .ok_or_else(|| AppError::bad_request(format!("assigned person not found: {id}")))?;
    Ok(Some(person.name))
}

// Persons

pub(super) async fn list_persons(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::PersonDto>>, AppError> {
    let rows = state.store.list_persons().await?;
    Ok(Json(rows.into_iter().map(person_dto).collect()))
}

pub(super) async fn get_person(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<api::PersonDto>, AppError> {
    let person = state
        .store
        .get_person(id)
        .await?
        .ok_or_else(|| AppError::not_found("Person not found"))?;
    Ok(Json(person_dto(person)))
}

pub(super) async fn create_person(
    State(state): State<AppState>,
    Json(body): Json<api::CreatePersonReq>,
) -> Result<Json<api::PersonDto>, AppError> {
    let name = required_text(&body.name, "name")?;
    let pin_hash = match body.pin.as_deref().map(str::trim) {
        Some(pin) if !pin.is_empty() => {
            Some(auth::hash_pin(pin, state.config.pin_hash_cost).await?)
        }
        _ => None,
    };
    let order_index = state.store.list_persons().await?.len() as i32;
    let person = state
        .store
        .create_person(PersonInput {
            name,
            avatar: body.avatar.unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
            color: body.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            order_index,
            pin_hash,
            is_admin: body.is_admin,
        })
        .await?;
    tracing::info!(person_id = person.id, "persons: created");
    Ok(Json(person_dto(person)))
}

pub(super) async fn update_person(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<api::UpdatePersonReq>,
) -> Result<Json<api::PersonDto>, AppError> {
    let name = body
        .name
        .as_deref()
        .map(|n| required_text(n, "name"))
        .transpose()?;
    let pin_hash = match body.pin.as_deref().map(str::trim) {
        Some(pin) if !pin.is_empty() => {
            Some(auth::hash_pin(pin, state.config.pin_hash_cost).await?)
        }
        _ => None,
    };
    let changes = PersonChanges {
        name,
        avatar: body.avatar,
        color: body.color,
        order_index: body.order_index,
        pin_hash,
        is_admin: body.is_admin,
    };
    if changes.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }
    let person = state
        .store
        .update_person(id, changes)
        .await?
        .ok_or_else(|| AppError::not_found("Person not found"))?;
    Ok(Json(person_dto(person)))
}

pub(super) async fn delete_person(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<Json<api::SuccessResp>, AppError> {
    let person = state.ledger.delete_person(id, &auth.actor).await?;
    Ok(success(format!("Person {} deleted", person.name)))
}

pub(super) async fn bonus_points(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Json(body): Json<api::BonusPointsReq>,
) -> Result<Json<api::PersonDto>, AppError> {
    let person = state
        .ledger
        .award_bonus_points(id, body.points, &auth.actor)
        .await?;
    Ok(Json(person_dto(person)))
}

pub(super) async fn reset_points(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    body: axum::body::Bytes,
) -> Result<Json<api::PersonDto>, AppError> {
    // an empty body resets to zero
    let points = if body.is_empty() {
        0
    } else {
        serde_json::from_slice::<api::ResetPointsReq>(&body)
            .map_err(|e| AppError::bad_request(format!("invalid body: {e}")))?
            .points
    };
    let person = state.ledger.reset_points(id, points, &auth.actor).await?;
    Ok(Json(person_dto(person)))
}

// Chores

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListFilter {
    assigned_to_id: Option<i32>,
    completed: Option<bool>,
}

impl From<ListFilter> for RowFilter {
    fn from(value: ListFilter) -> Self {
        RowFilter {
            assigned_to_id: value.assigned_to_id,
            completed: value.completed,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ChoreLookup {
    #[serde(default)]
    include_deleted: bool,
}

pub(super) async fn list_chores(
    State(state): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> Result<Json<Vec<api::ChoreDto>>, AppError> {
    let rows = state.store.list_chores(filter.into()).await?;
    Ok(Json(rows.into_iter().map(chore_dto).collect()))
}

/// `include_deleted` is honored for admins only.
pub(super) async fn get_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Query(lookup): Query<ChoreLookup>,
) -> Result<Json<api::ChoreDto>, AppError> {
    let include_deleted = lookup.include_deleted && auth.actor.is_admin;
    let row = state
        .store
        .find_chore(id, include_deleted)
        .await?
        .ok_or_else(|| AppError::not_found("Chore not found"))?;
    Ok(Json(chore_dto(row)))
}

pub(super) async fn create_chore(
    State(state): State<AppState>,
    Json(body): Json<api::CreateChoreReq>,
) -> Result<Json<api::ChoreDto>, AppError> {
    let title = required_text(&body.title, "title")?;
    let points = body.points.unwrap_or(1);
    if points < 0 {
        return Err(AppError::bad_request("points must not be negative"));
    }
    let due_date = parse_due_date(body.due_date.as_deref())?;
    let owner = assignee_name(&state, body.assigned_to_id).await?;
    let chore = state
        .store
        .create_chore(ChoreInput {
            title,
            assigned_to_id: body.assigned_to_id,
            assigned_to: body.assigned_to.or(owner),
            points,
            is_daily: body.is_daily.unwrap_or(false),
            due_date,
        })
        .await?;
    let row = state
        .store
        .find_chore(chore.id, false)
        .await?
        .ok_or_else(|| AppError::internal("created chore vanished"))?;
    Ok(Json(chore_dto(row)))
}

pub(super) async fn update_chore(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<api::UpdateChoreReq>,
) -> Result<Json<api::ChoreDto>, AppError> {
    let title = body
        .title
        .as_deref()
        .map(|t| required_text(t, "title"))
        .transpose()?;
    if body.points.is_some_and(|p| p < 0) {
        return Err(AppError::bad_request("points must not be negative"));
    }
    let owner = assignee_name(&state, body.assigned_to_id).await?;
    let changes = ChoreChanges {
        title,
        assigned_to_id: body.assigned_to_id,
        assigned_to: body.assigned_to.or(owner),
        points: body.points,
        is_daily: body.is_daily,
        due_date: parse_due_date(body.due_date.as_deref())?,
    };
    if changes.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }
    state
        .store
        .update_chore(id, changes)
        .await?
        .ok_or_else(|| AppError::not_found("Chore not found"))?;
    let row = state
        .store
        .find_chore(id, false)
        .await?
        .ok_or_else(|| AppError::not_found("Chore not found"))?;
    Ok(Json(chore_dto(row)))
}

pub(super) async fn delete_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<Json<api::SuccessResp>, AppError> {
    let message = match state.ledger.delete_chore(id, &auth.actor).await? {
        ChoreRemoval::Soft => "Daily chore archived",
        ChoreRemoval::Hard => "Chore deleted",
    };
    Ok(success(message))
}

pub(super) async fn complete_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<Json<api::ChoreDto>, AppError> {
    let done = state.ledger.complete_chore(id, &auth.actor).await?;
    let row = state
        .store
        .find_chore(done.chore.id, false)
        .await?
        .ok_or_else(|| AppError::not_found("Chore not found"))?;
    Ok(Json(chore_dto(row)))
}

pub(super) async fn reset_daily_chores(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::ResetDailyResp>, AppError> {
    let reset = state.ledger.reset_daily_chores(&auth.actor).await?;
    Ok(Json(api::ResetDailyResp { reset }))
}

// Rewards

pub(super) async fn list_rewards(
    State(state): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> Result<Json<Vec<api::RewardDto>>, AppError> {
    let rows = state.store.list_rewards(filter.into()).await?;
    Ok(Json(rows.into_iter().map(reward_dto).collect()))
}

pub(super) async fn create_reward(
    State(state): State<AppState>,
    Json(body): Json<api::CreateRewardReq>,
) -> Result<Json<api::RewardDto>, AppError> {
    let title = required_text(&body.title, "title")?;
    if body.points_required < 0 {
        return Err(AppError::bad_request("points_required must not be negative"));
    }
    let owner = assignee_name(&state, body.assigned_to_id).await?;
    let reward = state
        .store
        .create_reward(RewardInput {
            title,
            points_required: body.points_required,
            assigned_to_id: body.assigned_to_id,
            assigned_to: body.assigned_to.or(owner),
            is_one_time: body.is_one_time.unwrap_or(true),
        })
        .await?;
    reward_response(&state, reward.id).await
}

pub(super) async fn delete_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<Json<api::SuccessResp>, AppError> {
    state.ledger.delete_reward(id, &auth.actor).await?;
    Ok(success("Reward deleted"))
}

pub(super) async fn redeem_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<Json<api::RedeemResp>, AppError> {
    let redemption = state.ledger.redeem_reward(id, &auth.actor).await?;
    let Json(reward) = reward_response(&state, redemption.reward.id).await?;
    Ok(Json(api::RedeemResp {
        reward,
        new_balance: redemption.new_balance,
    }))
}

pub(super) async fn fulfill_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<Json<api::RewardDto>, AppError> {
    let reward = state.ledger.fulfill_reward(id, &auth.actor).await?;
    reward_response(&state, reward.id).await
}

pub(super) async fn pending_redemptions(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::RewardDto>>, AppError> {
    let rows = state.store.list_pending_redemptions().await?;
    Ok(Json(rows.into_iter().map(reward_dto).collect()))
}

async fn reward_response(state: &AppState, id: i32) -> Result<Json<api::RewardDto>, AppError> {
    let row = state
        .store
        .get_reward(id)
        .await?
        .ok_or_else(|| AppError::not_found("Reward not found"))?;
    Ok(Json(reward_dto(row)))
}

// Activity log

#[derive(Debug, Deserialize)]
pub(super) struct ActivityQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub(super) async fn list_activities(
    State(state): State<AppState>,
    Query(q): Query<ActivityQuery>,
) -> Result<Json<Vec<api::ActivityDto>>, AppError> {
    let rows = state
        .store
        .list_activity(
            q.kind.as_deref().filter(|k| !k.is_empty()),
            q.limit.unwrap_or(50),
            q.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(rows.into_iter().map(activity_dto).collect()))
}

// Settings

pub(super) async fn list_settings(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, String>>, AppError> {
    let rows = state.store.list_settings().await?;
    Ok(Json(
        rows.into_iter()
            .filter(|s| s.key != MASTER_PIN_KEY)
            .map(|s| (s.key, s.value))
            .collect(),
    ))
}

pub(super) async fn get_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<api::SettingDto>, AppError> {
    if key == MASTER_PIN_KEY {
        return Err(AppError::forbidden());
    }
    let value = state
        .store
        .get_setting(&key)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Setting not found: {key}")))?;
    Ok(Json(api::SettingDto { key, value }))
}

pub(super) async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<api::SettingUpdateReq>,
) -> Result<Json<api::SettingDto>, AppError> {
    if key == MASTER_PIN_KEY {
        return Err(AppError::forbidden());
    }
    let key = required_text(&key, "key")?;
    state.store.put_setting(&key, &body.value).await?;
    Ok(Json(api::SettingDto {
        key,
        value: body.value,
    }))
}

use super::{actor_from_headers, ApiError, ApiResult, AppState};
use crate::database::models::{ProfileRecord, Role};
use crate::error::ForumError;
use crate::identity::IdentityEvent;
use crate::profiles::{CreateProfileInput, UpdateProfileInput};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct NewProfileRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileUpdateRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoleRequest {
    role: Role,
}

#[derive(Debug, Serialize)]
pub(crate) struct WebhookResponse {
    event: &'static str,
    profile: Option<ProfileRecord>,
}

pub(crate) async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<ProfileRecord> {
    let profile = state
        .profiles
        .get_profile(&user_id)?
        .ok_or_else(|| ForumError::not_found("profile not found"))?;
    Ok(Json(profile))
}

/// Creates the caller's own profile; an existing one is returned unchanged.
pub(crate) async fn create_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewProfileRequest>,
) -> Result<(StatusCode, Json<ProfileRecord>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let profile = state.profiles.create_profile(CreateProfileInput {
        username: payload.username.unwrap_or_else(|| actor.name.clone()),
        user_id: actor.id,
        bio: payload.bio,
    })?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// Owners edit their own profile; admins may edit anyone's.
pub(crate) async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(payload): Json<ProfileUpdateRequest>,
) -> ApiResult<ProfileRecord> {
    let actor = actor_from_headers(&headers)?;
    if actor.id != user_id {
        state.profiles.require_role(&actor.id, Role::Admin)?;
    }
    let profile = state.profiles.update_profile(UpdateProfileInput {
        user_id,
        username: payload.username,
        bio: payload.bio,
    })?;
    Ok(Json(profile))
}

pub(crate) async fn set_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(payload): Json<RoleRequest>,
) -> ApiResult<ProfileRecord> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.profiles.set_role(&actor, &user_id, payload.role)?))
}

/// Pulls the caller from the identity provider and creates a profile if
/// none exists yet.
pub(crate) async fn sync_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ProfileRecord> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.identity.sync_profile(&actor.id).await?))
}

pub(crate) async fn identity_webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> ApiResult<WebhookResponse> {
    let event = IdentityEvent::from_json(payload)?;
    let kind = event.kind();
    let profile = state.identity.process_event(event)?;
    Ok(Json(WebhookResponse {
        event: kind,
        profile,
    }))
}

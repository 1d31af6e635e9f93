use super::{actor_from_headers, ApiError, ApiResult, AppState};
use crate::database::models::NotificationRecord;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct NotificationsResponse {
    notifications: Vec<NotificationRecord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UnreadCountResponse {
    unread: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct MarkAllReadResponse {
    updated: usize,
}

pub(crate) async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<NotificationsResponse> {
    let actor = actor_from_headers(&headers)?;
    let notifications = state.notifications.list(&actor.id)?;
    Ok(Json(NotificationsResponse { notifications }))
}

pub(crate) async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<UnreadCountResponse> {
    let actor = actor_from_headers(&headers)?;
    let unread = state.notifications.unread_count(&actor.id)?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub(crate) async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.notifications.mark_as_read(&actor.id, &notification_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<MarkAllReadResponse> {
    let actor = actor_from_headers(&headers)?;
    let updated = state.notifications.mark_all_as_read(&actor.id)?;
    Ok(Json(MarkAllReadResponse { updated }))
}

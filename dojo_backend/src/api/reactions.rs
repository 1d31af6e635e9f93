use super::{actor_from_headers, optional_actor, ApiError, ApiResult, AppState};
use crate::database::models::{ReactionTarget, TargetKind};
use crate::reactions::ActorLikes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct LikeStatusResponse {
    liked: bool,
    like_count: i64,
}

fn parse_target(kind: &str, id: String) -> Result<ReactionTarget, ApiError> {
    let kind: TargetKind = kind
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("cannot like a {kind:?}")))?;
    Ok(ReactionTarget::new(kind, id))
}

/// Flips the caller's like on `/likes/{kind}/{id}`.
pub(crate) async fn toggle_like(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<LikeStatusResponse> {
    let actor = actor_from_headers(&headers)?;
    let target = parse_target(&kind, id)?;
    let liked = state.reactions.toggle_like(&actor, &target)?;
    let like_count = state.reactions.like_count(&target)?;
    Ok(Json(LikeStatusResponse { liked, like_count }))
}

/// Current count, plus whether the caller (if any) likes the target.
pub(crate) async fn like_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<LikeStatusResponse> {
    let target = parse_target(&kind, id)?;
    let like_count = state.reactions.like_count(&target)?;
    let liked = match optional_actor(&headers) {
        Some(actor) => state.reactions.has_liked(&actor.id, &target)?,
        None => false,
    };
    Ok(Json(LikeStatusResponse { liked, like_count }))
}

pub(crate) async fn likes_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<ActorLikes> {
    Ok(Json(state.reactions.likes_by_actor(&user_id)?))
}

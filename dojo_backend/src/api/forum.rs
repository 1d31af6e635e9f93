use super::{actor_from_headers, ApiError, ApiResult, AppState};
use crate::database::models::{ReplyRecord, ThreadRecord, TopicRecord};
use crate::forum::{CreateReplyInput, CreateThreadInput, CreateTopicInput, ThreadDetails};
use crate::seed::{self, SeedOutcome};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct ListThreadsParams {
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentThreadsParams {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewThreadRequest {
    topic_id: String,
    title: String,
    content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewReplyRequest {
    content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PinRequest {
    pinned: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LockRequest {
    locked: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct TopicsResponse {
    topics: Vec<TopicRecord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ThreadsResponse {
    threads: Vec<ThreadRecord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RepliesResponse {
    replies: Vec<ReplyRecord>,
}

pub(crate) async fn seed_handler(State(state): State<AppState>) -> ApiResult<SeedOutcome> {
    let outcome = seed::seed(&state.database)?;
    Ok(Json(outcome))
}

pub(crate) async fn list_topics(State(state): State<AppState>) -> ApiResult<TopicsResponse> {
    let topics = state.forum.list_topics()?;
    Ok(Json(TopicsResponse { topics }))
}

pub(crate) async fn get_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> ApiResult<TopicRecord> {
    Ok(Json(state.forum.get_topic(&topic_id)?))
}

pub(crate) async fn create_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTopicInput>,
) -> Result<(StatusCode, Json<TopicRecord>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let topic = state.forum.create_topic(&actor, payload)?;
    Ok((StatusCode::CREATED, Json(topic)))
}

pub(crate) async fn list_topic_threads(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> ApiResult<ThreadsResponse> {
    state.forum.get_topic(&topic_id)?;
    let threads = state.forum.list_threads(&topic_id)?;
    Ok(Json(ThreadsResponse { threads }))
}

pub(crate) async fn list_threads(
    State(state): State<AppState>,
    Query(params): Query<ListThreadsParams>,
) -> ApiResult<ThreadsResponse> {
    let threads = match params.author.as_deref() {
        Some(author) => state.forum.threads_by_author(author)?,
        None => state.forum.list_all_threads()?,
    };
    Ok(Json(ThreadsResponse { threads }))
}

pub(crate) async fn recent_threads(
    State(state): State<AppState>,
    Query(params): Query<RecentThreadsParams>,
) -> ApiResult<ThreadsResponse> {
    let threads = state.forum.recent_threads(params.limit)?;
    Ok(Json(ThreadsResponse { threads }))
}

pub(crate) async fn threads_by_author(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<ThreadsResponse> {
    let threads = state.forum.threads_by_author(&user_id)?;
    Ok(Json(ThreadsResponse { threads }))
}

pub(crate) async fn create_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewThreadRequest>,
) -> Result<(StatusCode, Json<ThreadRecord>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let thread = state.forum.create_thread(
        &actor,
        CreateThreadInput {
            topic_id: payload.topic_id,
            title: payload.title,
            content: payload.content,
            created_at: None,
        },
    )?;
    Ok((StatusCode::CREATED, Json(thread)))
}

pub(crate) async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<ThreadDetails> {
    Ok(Json(state.forum.get_thread(&thread_id)?))
}

pub(crate) async fn delete_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.forum.delete_thread(&actor, &thread_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn increment_views(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.forum.increment_views(&thread_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn set_pinned(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
    Json(payload): Json<PinRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.forum.set_pinned(&actor, &thread_id, payload.pinned)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn set_locked(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
    Json(payload): Json<LockRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.forum.set_locked(&actor, &thread_id, payload.locked)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_replies(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<RepliesResponse> {
    state.forum.get_thread(&thread_id)?;
    let replies = state.forum.list_replies(&thread_id)?;
    Ok(Json(RepliesResponse { replies }))
}

pub(crate) async fn create_reply(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
    Json(payload): Json<NewReplyRequest>,
) -> Result<(StatusCode, Json<ReplyRecord>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let reply = state.forum.create_reply(
        &actor,
        CreateReplyInput {
            thread_id,
            content: payload.content,
            created_at: None,
        },
    )?;
    Ok((StatusCode::CREATED, Json(reply)))
}

pub(crate) async fn delete_reply(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(reply_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.forum.delete_reply(&actor, &reply_id)?;
    Ok(StatusCode::NO_CONTENT)
}

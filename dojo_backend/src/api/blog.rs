use super::{actor_from_headers, ApiError, ApiResult, AppState};
use crate::blog::{
    Archive, BlogPostView, CreateCommentInput, CreatePostInput, FacetCount, PostFilter,
    UpdatePostInput,
};
use crate::database::models::CommentRecord;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct PostsResponse {
    posts: Vec<BlogPostView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentsResponse {
    comments: Vec<CommentRecord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FacetsResponse {
    items: Vec<FacetCount>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MostVisitedParams {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewCommentRequest {
    content: String,
    #[serde(default)]
    parent_id: Option<String>,
}

pub(crate) async fn list_posts(
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
) -> ApiResult<PostsResponse> {
    let posts = state.blog.list_posts(&filter)?;
    Ok(Json(PostsResponse { posts }))
}

pub(crate) async fn list_all_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<PostsResponse> {
    let actor = actor_from_headers(&headers)?;
    let posts = state.blog.list_all(&actor)?;
    Ok(Json(PostsResponse { posts }))
}

pub(crate) async fn most_visited(
    State(state): State<AppState>,
    Query(params): Query<MostVisitedParams>,
) -> ApiResult<PostsResponse> {
    let posts = state.blog.most_visited(params.limit)?;
    Ok(Json(PostsResponse { posts }))
}

pub(crate) async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePostInput>,
) -> Result<(StatusCode, Json<BlogPostView>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let post = state.blog.create_post(&actor, payload)?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub(crate) async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<BlogPostView> {
    Ok(Json(state.blog.get_post(&post_id)?))
}

pub(crate) async fn get_post_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<BlogPostView> {
    Ok(Json(state.blog.get_by_slug(&slug)?))
}

pub(crate) async fn update_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    Json(payload): Json<UpdatePostInput>,
) -> ApiResult<BlogPostView> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.blog.update_post(&actor, &post_id, payload)?))
}

pub(crate) async fn remove_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.blog.remove_post(&actor, &post_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn record_view(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.blog.record_view(&post_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<CommentsResponse> {
    state.blog.get_post(&post_id)?;
    let comments = state.blog.list_comments(&post_id)?;
    Ok(Json(CommentsResponse { comments }))
}

pub(crate) async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    Json(payload): Json<NewCommentRequest>,
) -> Result<(StatusCode, Json<CommentRecord>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let comment = state.blog.create_comment(
        &actor,
        CreateCommentInput {
            post_id,
            content: payload.content,
            parent_id: payload.parent_id,
        },
    )?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub(crate) async fn categories(State(state): State<AppState>) -> ApiResult<FacetsResponse> {
    let items = state.blog.categories()?;
    Ok(Json(FacetsResponse { items }))
}

pub(crate) async fn tags(State(state): State<AppState>) -> ApiResult<FacetsResponse> {
    let items = state.blog.tags()?;
    Ok(Json(FacetsResponse { items }))
}

pub(crate) async fn archive(State(state): State<AppState>) -> ApiResult<Archive> {
    Ok(Json(state.blog.archive()?))
}

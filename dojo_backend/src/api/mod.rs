mod blog;
mod forum;
mod notifications;
mod profiles;
mod reactions;
mod storage;

use crate::blog::BlogService;
use crate::config::DojoConfig;
use crate::database::Database;
use crate::error::ForumError;
use crate::files::ImageService;
use crate::forum::ForumService;
use crate::identity::{IdentityClient, IdentityService};
use crate::notifications::NotificationService;
use crate::profiles::{Actor, ProfileService};
use crate::reactions::ReactionService;
use anyhow::Result;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_AVATAR_HEADER: &str = "x-user-avatar";

#[derive(Clone)]
pub struct AppState {
    pub config: DojoConfig,
    pub database: Database,
    pub forum: ForumService,
    pub blog: BlogService,
    pub reactions: ReactionService,
    pub profiles: ProfileService,
    pub notifications: NotificationService,
    pub identity: IdentityService,
    pub images: ImageService,
}

impl AppState {
    pub fn new(config: DojoConfig, database: Database) -> Result<Self> {
        let identity_client = IdentityClient::from_config(&config.identity)?;
        if identity_client.is_none() {
            tracing::info!("identity provider not configured; profile sync disabled");
        }
        Ok(Self {
            forum: ForumService::new(database.clone()),
            blog: BlogService::new(database.clone(), config.public_url.clone()),
            reactions: ReactionService::new(database.clone()),
            profiles: ProfileService::new(database.clone()),
            notifications: NotificationService::new(database.clone()),
            identity: IdentityService::new(database.clone(), identity_client),
            images: ImageService::new(database.clone(), config.paths.clone(), &config.file),
            config,
            database,
        })
    }
}

pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadGateway(String),
    Internal(anyhow::Error),
}

impl ApiError {
    fn into_response_parts(self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse { message: msg }),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorResponse { message: msg })
            }
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, ErrorResponse { message: msg }),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse { message: msg }),
            ApiError::BadGateway(msg) => {
                tracing::warn!(error = %msg, "upstream failure");
                (StatusCode::BAD_GATEWAY, ErrorResponse { message: msg })
            }
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        message: "internal server error".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.into_response_parts();
        (status, Json(body)).into_response()
    }
}

impl From<ForumError> for ApiError {
    fn from(err: ForumError) -> Self {
        match err {
            ForumError::NotFound(msg) => ApiError::NotFound(msg),
            ForumError::InvalidInput(msg) => ApiError::BadRequest(msg),
            ForumError::Unauthenticated => {
                ApiError::Unauthorized("authentication required".into())
            }
            ForumError::Unauthorized(msg) => ApiError::Forbidden(msg),
            ForumError::Upstream(msg) => ApiError::BadGateway(msg),
            ForumError::Internal(err) => ApiError::Internal(err),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ForumError::from(err).into()
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

/// The caller as vouched for by the identity provider's session, which the
/// fronting proxy forwards in the `x-user-*` headers.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    optional_actor(headers).ok_or_else(|| ForumError::Unauthenticated.into())
}

pub(crate) fn optional_actor(headers: &HeaderMap) -> Option<Actor> {
    let id = header_str(headers, USER_ID_HEADER)?;
    let name = header_str(headers, USER_NAME_HEADER).unwrap_or("Anonymous");
    let actor = Actor::new(id, name);
    Some(match header_str(headers, USER_AVATAR_HEADER) {
        Some(avatar) => actor.with_image(avatar),
        None => actor,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
    api_port: u16,
    identity_sync: bool,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        api_port: state.config.api_port,
        identity_sync: state.config.identity.api_url.is_some(),
    })
}

/// Tries to bind to the given port, or finds the next available port
async fn find_available_port(start_port: u16) -> Result<(TcpListener, u16)> {
    const MAX_PORT_ATTEMPTS: u16 = 100;

    for offset in 0..MAX_PORT_ATTEMPTS {
        let Some(port) = start_port.checked_add(offset) else {
            break;
        };
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => {
                if offset == 0 {
                    tracing::debug!(port, error = %e, "Port in use, trying next port");
                }
                continue;
            }
        }
    }

    anyhow::bail!(
        "Could not find available port in range {}-{}",
        start_port,
        start_port.saturating_add(MAX_PORT_ATTEMPTS - 1)
    )
}

/// Every REST route, bound to `state`.
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.file.max_upload_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/seed", post(forum::seed_handler))
        .route("/topics", get(forum::list_topics).post(forum::create_topic))
        .route("/topics/:id", get(forum::get_topic))
        .route("/topics/:id/threads", get(forum::list_topic_threads))
        .route("/threads", get(forum::list_threads).post(forum::create_thread))
        .route("/threads/recent", get(forum::recent_threads))
        .route("/threads/:id", get(forum::get_thread).delete(forum::delete_thread))
        .route("/threads/:id/view", post(forum::increment_views))
        .route("/threads/:id/pin", post(forum::set_pinned))
        .route("/threads/:id/lock", post(forum::set_locked))
        .route("/threads/:id/replies", get(forum::list_replies).post(forum::create_reply))
        .route("/replies/:id", delete(forum::delete_reply))
        .route("/posts", get(blog::list_posts).post(blog::create_post))
        .route("/posts/all", get(blog::list_all_posts))
        .route("/posts/most-visited", get(blog::most_visited))
        .route("/posts/slug/:slug", get(blog::get_post_by_slug))
        .route(
            "/posts/:id",
            get(blog::get_post).patch(blog::update_post).delete(blog::remove_post),
        )
        .route("/posts/:id/view", post(blog::record_view))
        .route("/posts/:id/comments", get(blog::list_comments).post(blog::create_comment))
        .route("/blog/categories", get(blog::categories))
        .route("/blog/tags", get(blog::tags))
        .route("/blog/archive", get(blog::archive))
        .route("/likes/:kind/:id", get(reactions::like_status).post(reactions::toggle_like))
        .route("/users/:user_id/likes", get(reactions::likes_by_user))
        .route("/users/:user_id/threads", get(forum::threads_by_author))
        .route("/profiles", post(profiles::create_profile))
        .route("/profiles/sync", post(profiles::sync_profile))
        .route(
            "/profiles/:user_id",
            get(profiles::get_profile).patch(profiles::update_profile),
        )
        .route("/profiles/:user_id/role", post(profiles::set_role))
        .route("/webhooks/identity", post(profiles::identity_webhook))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/storage/upload-url", post(storage::issue_upload_url))
        .route("/storage/upload/:token", post(storage::upload_blob))
        .route("/storage/:id", get(storage::download_blob))
        .route("/storage/:id/images", get(storage::list_images))
        .route("/images", post(storage::save_image_metadata))
        .layer(DefaultBodyLimit::max(max_upload_bytes as usize))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve_http(config: DojoConfig, database: Database) -> Result<()> {
    let state = AppState::new(config.clone(), database)?;

    tracing::info!(
        max_body_limit_mb = config.file.max_upload_bytes / (1024 * 1024),
        public_url = %config.public_url,
        "Configured upload body limit"
    );
    let router = build_router(state);

    // Try to bind to the configured port, or find the next available port
    let (listener, actual_port) = find_available_port(config.api_port).await?;
    let addr = SocketAddr::from(([0, 0, 0, 0], actual_port));

    if actual_port != config.api_port {
        tracing::warn!(
            requested_port = config.api_port,
            actual_port = actual_port,
            "Configured port was in use, bound to next available port"
        );
    }

    tracing::info!(?addr, "HTTP server listening");
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forum_errors_map_to_status_codes() {
        let cases = [
            (ForumError::not_found("x"), StatusCode::NOT_FOUND),
            (ForumError::invalid("x"), StatusCode::BAD_REQUEST),
            (ForumError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ForumError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (ForumError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (
                ForumError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let (actual, _) = ApiError::from(err).into_response_parts();
            assert_eq!(actual, status);
        }
    }

    #[test]
    fn actor_headers_are_trimmed_and_optional() {
        let mut headers = HeaderMap::new();
        assert!(optional_actor(&headers).is_none());
        assert!(actor_from_headers(&headers).is_err());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" user_1 "));
        let actor = actor_from_headers(&headers).unwrap();
        assert_eq!(actor.id, "user_1");
        assert_eq!(actor.name, "Anonymous");
        assert!(actor.image_url.is_none());

        headers.insert(USER_NAME_HEADER, HeaderValue::from_static("Lyoto"));
        headers.insert(USER_AVATAR_HEADER, HeaderValue::from_static("/a.png"));
        let actor = actor_from_headers(&headers).unwrap();
        assert_eq!(actor.name, "Lyoto");
        assert_eq!(actor.image_url.as_deref(), Some("/a.png"));
    }
}

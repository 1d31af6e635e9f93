use super::{ApiError, ApiResult, AppState};
use crate::database::models::ImageRecord;
use crate::files::{ImageMetadataInput, StoreUploadInput, StoredBlobView, UploadTicket};
use anyhow::Context;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{
    header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    HeaderMap, HeaderValue, StatusCode,
};
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tokio::fs::File as TokioFile;
use tokio_util::io::ReaderStream;

const IMMUTABLE_CACHE: &str = "public, max-age=31536000";

#[derive(Debug, Serialize)]
pub(crate) struct ImagesResponse {
    images: Vec<ImageRecord>,
}

pub(crate) async fn issue_upload_url(State(state): State<AppState>) -> ApiResult<UploadTicket> {
    Ok(Json(state.images.issue_upload_url()?))
}

/// Accepts the raw request body as the blob; the declared `Content-Type` is
/// kept when present.
pub(crate) async fn upload_blob(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<StoredBlobView>), ApiError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let stored = state
        .images
        .store_upload(StoreUploadInput {
            token,
            content_type,
            data: body.to_vec(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub(crate) async fn download_blob(
    State(state): State<AppState>,
    Path(storage_id): Path<String>,
) -> Result<Response, ApiError> {
    let download = state.images.prepare_download(&storage_id).await?;

    let file = TokioFile::open(&download.absolute_path)
        .await
        .with_context(|| format!("unable to open {}", download.absolute_path.display()))?;
    let stream = ReaderStream::new(file);
    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();

    let content_type = download
        .record
        .mime
        .as_deref()
        .unwrap_or("application/octet-stream");
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&download.record.size_bytes.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE_CACHE));

    Ok(response)
}

pub(crate) async fn save_image_metadata(
    State(state): State<AppState>,
    Json(payload): Json<ImageMetadataInput>,
) -> Result<(StatusCode, Json<ImageRecord>), ApiError> {
    let image = state.images.save_image_metadata(payload)?;
    Ok((StatusCode::CREATED, Json(image)))
}

pub(crate) async fn list_images(
    State(state): State<AppState>,
    Path(storage_id): Path<String>,
) -> ApiResult<ImagesResponse> {
    let images = state.images.images_for_blob(&storage_id)?;
    Ok(Json(ImagesResponse { images }))
}

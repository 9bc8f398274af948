use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::common::response::ApiError;
use crate::infrastructure::storage::StorageError;
use crate::state::AppState;

/// Stream a stored blob: an uploaded source, a playlist, or a segment
/// Proxies the stream from S3/MinIO to the client
#[utoipa::path(
    get,
    path = "/api/v1/videos/{name}",
    params(
        ("name" = String, Path, description = "Blob name (video id, playlist.m3u8, segment_NNN.ts)")
    ),
    responses(
        (status = 200, description = "Stream Content"),
        (status = 404, description = "Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn stream_video(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if name.is_empty() || name.contains("..") {
        return ApiError::bad_request("Invalid blob name").into_response();
    }

    let blob = match state.storage.retrieve(&name).await {
        Ok(blob) => blob,
        Err(StorageError::NotFound(_)) => {
            return ApiError::not_found(format!("'{}' not found", name)).into_response();
        }
        Err(e) => {
            error!(file_name = %name, "Storage Error: {}", e);
            return ApiError::internal("Failed to retrieve file").into_response();
        }
    };

    info!(file_name = %name, size = blob.size, "Retrieved file");

    let body = Body::from_stream(ReaderStream::new(blob.body));

    axum::response::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, blob.content_type)
        .header(header::CONTENT_LENGTH, blob.size)
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

use std::io;

use axum::{
    extract::{
        multipart::{Field, MultipartError},
        Multipart, Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::TryStreamExt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio_util::io::StreamReader;
use tracing::error;

use super::dto::{PingResponse, ResubmitResponse, SystemInfo, UploadResponse};
use super::service::VideoService;
use super::UPLOAD_FIELD;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::infrastructure::storage::BlobReader;
use crate::state::AppState;

fn field_reader<'a>(field: Field<'a>) -> BlobReader<'a> {
    Box::pin(StreamReader::new(field.map_err(multipart_io_error)))
}

// Keeps a body-limit failure recognisable once it is an io::Error.
fn multipart_io_error(e: MultipartError) -> io::Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        io::Error::new(io::ErrorKind::FileTooLarge, e.body_text())
    } else {
        io::Error::other(e)
    }
}

/// Service liveness
#[utoipa::path(
    get,
    path = "/api/v1/ping",
    responses(
        (status = 200, description = "Service available", body = ApiResponse<PingResponse>)
    ),
    tag = "Videos"
)]
pub async fn ping() -> impl IntoResponse {
    let server_timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    ApiSuccess::ok(
        PingResponse {
            status: "available".to_string(),
            system_info: SystemInfo { server_timestamp },
        },
        "pong",
    )
}

/// Upload a video for HLS transcoding
/// The file is streamed straight to object storage and queued for processing.
#[utoipa::path(
    post,
    path = "/api/v1/videos",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Upload accepted and queued", body = ApiResponse<UploadResponse>),
        (status = 400, description = "Bad Request"),
        (status = 413, description = "Payload Too Large"),
        (status = 415, description = "Not a video"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(format!("Invalid multipart body: {}", e), e.status()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        return match VideoService::accept_upload(&state, field_reader(field), &content_type).await {
            Ok(res) => Ok(ApiSuccess::accepted(res, "Video uploaded and queued for processing")),
            Err(e) => {
                error!("Video upload failed: {}", e);
                Err(ApiError(e.to_string(), e.status()))
            }
        };
    }

    Err(ApiError::bad_request(format!(
        "Missing '{}' field",
        UPLOAD_FIELD
    )))
}

/// Queue a stored video for processing again
#[utoipa::path(
    post,
    path = "/api/v1/videos/{id}/process",
    params(
        ("id" = String, Path, description = "Video ID")
    ),
    responses(
        (status = 202, description = "Video queued", body = ApiResponse<ResubmitResponse>),
        (status = 400, description = "Invalid video id"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn resubmit_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match VideoService::resubmit(&state, &id).await {
        Ok(job_id) => ApiSuccess::accepted(
            ResubmitResponse {
                video_id: job_id.to_string(),
            },
            "Video queued for processing",
        )
        .into_response(),
        Err(e) => {
            error!(video_id = %id, "Failed to resubmit video: {}", e);
            ApiError(e.to_string(), e.status()).into_response()
        }
    }
}

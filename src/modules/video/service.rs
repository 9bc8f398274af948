use std::io;

use axum::http::StatusCode;
use thiserror::Error;
use tracing::info;

use super::dto::UploadResponse;
use super::events::TranscodeJob;
use super::model::{JobId, JobIdError};
use crate::infrastructure::storage::{BlobReader, StorageError};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("Invalid content type '{0}': only video/* allowed")]
    InvalidContentType(String),
    #[error("Invalid video id: {0}")]
    InvalidId(#[from] JobIdError),
    #[error("Video exceeds the upload size limit")]
    TooLarge,
    #[error("Failed to store video: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to queue video for processing: {0}")]
    Queue(anyhow::Error),
}

impl VideoError {
    pub fn status(&self) -> StatusCode {
        match self {
            VideoError::InvalidContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            VideoError::InvalidId(_) => StatusCode::BAD_REQUEST,
            VideoError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            VideoError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            VideoError::Storage(_) | VideoError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub struct VideoService;

impl VideoService {
    fn ensure_video(content_type: &str) -> Result<(), VideoError> {
        match content_type.parse::<mime::Mime>() {
            Ok(m) if m.type_() == mime::VIDEO => Ok(()),
            _ => Err(VideoError::InvalidContentType(content_type.to_string())),
        }
    }

    /// Stores an uploaded source under a fresh job id and queues it for transcoding.
    pub async fn accept_upload(
        state: &AppState,
        body: BlobReader<'_>,
        content_type: &str,
    ) -> Result<UploadResponse, VideoError> {
        Self::ensure_video(content_type)?;

        let job_id = JobId::generate();
        info!(video_id = %job_id, content_type = %content_type, "Starting video upload...");

        let location = state
            .storage
            .upload(job_id.as_str(), body, content_type)
            .await
            .map_err(|e| match e {
                StorageError::Io(io) if io.kind() == io::ErrorKind::FileTooLarge => VideoError::TooLarge,
                other => VideoError::Storage(other),
            })?;
        info!(video_id = %job_id, "Uploaded video");

        Self::enqueue(state, &job_id).await?;

        Ok(UploadResponse {
            video_id: job_id.to_string(),
            location,
        })
    }

    pub async fn resubmit(state: &AppState, raw_id: &str) -> Result<JobId, VideoError> {
        let job_id = JobId::parse(raw_id)?;
        Self::enqueue(state, &job_id).await?;
        info!(video_id = %job_id, "Video resubmitted for processing");
        Ok(job_id)
    }

    async fn enqueue(state: &AppState, job_id: &JobId) -> Result<(), VideoError> {
        let payload = TranscodeJob::new(job_id.clone()).to_payload();
        state
            .queue
            .publish(&state.config.job_queue_name, &payload)
            .await
            .map_err(VideoError::Queue)
    }
}

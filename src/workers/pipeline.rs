use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use super::dispatcher::JobHandler;
use super::transcoder::{TranscodeError, Transcoder};
use super::workspace::{Workspace, WorkspaceError};
use crate::infrastructure::storage::{BlobStore, StorageError};
use crate::modules::video::model::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Allocate,
    Download,
    Transcode,
    Enumerate,
    Upload,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Allocate => "allocate",
            Stage::Download => "download",
            Stage::Transcode => "transcode",
            Stage::Enumerate => "enumerate",
            Stage::Upload => "upload",
            Stage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to allocate workspace for job {job_id}: {source}")]
    Allocate {
        job_id: JobId,
        source: WorkspaceError,
    },
    #[error("failed to download source for job {job_id}: {source}")]
    Download {
        job_id: JobId,
        source: StorageError,
    },
    #[error("transcode failed for job {job_id}: {source}")]
    Transcode {
        job_id: JobId,
        source: TranscodeError,
    },
    #[error("failed to enumerate outputs for job {job_id}: {source}")]
    Enumerate {
        job_id: JobId,
        source: WorkspaceError,
    },
    #[error("failed to upload {name} for job {job_id}: {source}")]
    Upload {
        job_id: JobId,
        name: String,
        source: StorageError,
    },
    #[error("failed to delete source blob for job {job_id}: {source}")]
    Finalize {
        job_id: JobId,
        source: StorageError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Allocate { .. } => Stage::Allocate,
            PipelineError::Download { .. } => Stage::Download,
            PipelineError::Transcode { .. } => Stage::Transcode,
            PipelineError::Enumerate { .. } => Stage::Enumerate,
            PipelineError::Upload { .. } => Stage::Upload,
            PipelineError::Finalize { .. } => Stage::Finalize,
        }
    }
}

pub fn artifact_content_type(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl".to_string(),
        Some("ts") => "video/mp2t".to_string(),
        _ => mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

pub struct Pipeline {
    storage: Arc<dyn BlobStore>,
    transcoder: Arc<dyn Transcoder>,
    work_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        transcoder: Arc<dyn Transcoder>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            transcoder,
            work_dir: work_dir.into(),
        }
    }

    /// No rollback on error. The workspace is removed either way.
    pub async fn process(&self, job_id: &JobId) -> Result<(), PipelineError> {
        info!(job_id = %job_id, "Starting video processing");

        let workspace = Workspace::allocate(&self.work_dir, job_id)
            .await
            .map_err(|source| PipelineError::Allocate {
                job_id: job_id.clone(),
                source,
            })?;

        let result = self.run_stages(job_id, &workspace).await;

        // Cleanup failures are logged only, never reported as the job's outcome.
        if let Err(e) = workspace.release().await {
            error!(job_id = %job_id, error = %e, "Failed to delete temp files");
        }

        if result.is_ok() {
            info!(job_id = %job_id, "✅ Video processing complete");
        }
        result
    }

    async fn run_stages(&self, job_id: &JobId, workspace: &Workspace) -> Result<(), PipelineError> {
        let source_path = self.download(job_id, workspace).await?;
        info!(job_id = %job_id, stage = %Stage::Download, "Video downloaded to workspace");

        self.transcoder
            .transcode(&source_path, workspace.output_dir())
            .await
            .map_err(|source| PipelineError::Transcode {
                job_id: job_id.clone(),
                source,
            })?;
        info!(job_id = %job_id, stage = %Stage::Transcode, "HLS generation complete");

        let enumerate_err = |source| PipelineError::Enumerate {
            job_id: job_id.clone(),
            source,
        };
        let artifacts = workspace.list_outputs().await.map_err(enumerate_err)?;
        if artifacts.is_empty() {
            return Err(enumerate_err(WorkspaceError::NoOutputs(
                workspace.output_dir().to_path_buf(),
            )));
        }

        info!(
            job_id = %job_id,
            stage = %Stage::Upload,
            count = artifacts.len(),
            "Uploading rendition artifacts"
        );
        for artifact in &artifacts {
            self.upload_artifact(job_id, artifact).await?;
        }

        self.storage
            .delete(job_id.as_str())
            .await
            .map_err(|source| PipelineError::Finalize {
                job_id: job_id.clone(),
                source,
            })?;

        Ok(())
    }

    async fn download(&self, job_id: &JobId, workspace: &Workspace) -> Result<PathBuf, PipelineError> {
        let download_err = |source: StorageError| PipelineError::Download {
            job_id: job_id.clone(),
            source,
        };

        let mut blob = self
            .storage
            .retrieve(job_id.as_str())
            .await
            .map_err(download_err)?;

        info!(
            job_id = %job_id,
            size = blob.size,
            content_type = %blob.content_type,
            "⬇️ Downloading source blob"
        );

        let path = workspace.input_path(job_id);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| download_err(e.into()))?;
        tokio::io::copy(&mut blob.body, &mut file)
            .await
            .map_err(|e| download_err(e.into()))?;
        file.flush().await.map_err(|e| download_err(e.into()))?;

        Ok(path)
    }

    async fn upload_artifact(&self, job_id: &JobId, path: &Path) -> Result<(), PipelineError> {
        // The file name is used as the blob name
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let upload_err = |source: StorageError| PipelineError::Upload {
            job_id: job_id.clone(),
            name: name.clone(),
            source,
        };

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| upload_err(e.into()))?;

        self.storage
            .upload(&name, Box::pin(file), &artifact_content_type(path))
            .await
            .map_err(upload_err)?;

        Ok(())
    }
}

#[async_trait]
impl JobHandler for Pipeline {
    async fn handle(&self, job_id: JobId) -> anyhow::Result<()> {
        self.process(&job_id).await.map_err(|e| {
            let stage = e.stage();
            anyhow::Error::new(e).context(format!("{} stage failed", stage))
        })
    }
}

use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::config::env::{self, EnvKey};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    #[default]
    OnDelivery,
    // Rejected messages go to the dead-letter queue
    AfterProcessing,
}

impl FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_delivery" | "auto" => Ok(AckMode::OnDelivery),
            "after_processing" | "manual" => Ok(AckMode::AfterProcessing),
            other => Err(format!("unknown ack mode '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub rabbitmq_url: String,
    pub job_queue_name: String,
    pub ack_mode: AckMode,
    pub minio_url: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub work_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub max_concurrent_jobs: usize,
    pub max_upload_bytes: usize,
}

pub const DEFAULT_QUEUE_NAME: &str = "video_processing";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        let work_dir = env::get(EnvKey::WorkDir)
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            rabbitmq_url: env::get(EnvKey::RabbitMqUrl)?,
            job_queue_name: env::get_or(EnvKey::JobQueueName, DEFAULT_QUEUE_NAME),
            ack_mode: env::get_parsed(EnvKey::QueueAckMode, AckMode::default()),
            minio_url: env::get_or(EnvKey::MinioUrl, "http://localhost:9000"),
            minio_bucket: env::get_or(EnvKey::MinioBucket, "videos"),
            minio_access_key: env::get(EnvKey::MinioAccessKey)?,
            minio_secret_key: env::get(EnvKey::MinioSecretKey)?,
            work_dir,
            ffmpeg_path: PathBuf::from(env::get_or(EnvKey::FfmpegPath, "ffmpeg")),
            max_concurrent_jobs: env::get_parsed(EnvKey::MaxConcurrentJobs, default_concurrency())
                .max(1),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, DEFAULT_MAX_UPLOAD_BYTES),
        })
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_mode_parses_both_spellings() {
        assert_eq!("on_delivery".parse::<AckMode>(), Ok(AckMode::OnDelivery));
        assert_eq!("AUTO".parse::<AckMode>(), Ok(AckMode::OnDelivery));
        assert_eq!(
            " after_processing ".parse::<AckMode>(),
            Ok(AckMode::AfterProcessing)
        );
        assert_eq!("manual".parse::<AckMode>(), Ok(AckMode::AfterProcessing));
        assert!("sometimes".parse::<AckMode>().is_err());
    }

    #[test]
    fn default_concurrency_is_positive() {
        assert!(default_concurrency() >= 1);
    }
}

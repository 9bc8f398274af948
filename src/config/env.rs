use std::env;
use std::fmt::{Debug, Display};
use std::str::FromStr;

use tracing::warn;

pub enum EnvKey {
    ServerPort,
    RabbitMqUrl,
    JobQueueName,
    QueueAckMode,
    MinioUrl,
    MinioBucket,
    MinioAccessKey,
    MinioSecretKey,
    WorkDir,
    FfmpegPath,
    MaxConcurrentJobs,
    MaxUploadBytes,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::JobQueueName => "JOB_QUEUE_NAME",
            EnvKey::QueueAckMode => "QUEUE_ACK_MODE",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioBucket => "MINIO_BUCKET_VIDEOS",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::WorkDir => "WORK_DIR",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::MaxConcurrentJobs => "MAX_CONCURRENT_JOBS",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T>(key: EnvKey, default: T) -> T
where
    T: FromStr + Debug,
    T::Err: Display,
{
    parse_or(key.as_str(), get(key).ok().as_deref(), default)
}

fn parse_or<T>(name: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + Debug,
    T::Err: Display,
{
    let Some(raw) = raw else {
        return default;
    };

    match raw.parse::<T>() {
        Ok(val) => val,
        Err(e) => {
            warn!("Invalid {} '{}': {}. Falling back to {:?}", name, raw, e, default);
            default
        }
    }
}

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

use crate::config::settings::AppConfig;
use crate::infrastructure::queue::rabbitmq::{ConsumerSettings, RabbitMqService};
use crate::infrastructure::storage::s3::StorageService;
use crate::state::AppState;
use crate::workers::dispatcher::JobDispatcher;
use crate::workers::pipeline::Pipeline;
use crate::workers::transcoder::FfmpegTranscoder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenv().is_ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if !env_loaded {
        info!("No .env file found, relying on environment variables");
    }

    let config = AppConfig::new().context("Failed to load configuration")?;

    let storage = StorageService::new(
        &config.minio_url,
        &config.minio_bucket,
        &config.minio_access_key,
        &config.minio_secret_key,
    )
    .await;
    storage
        .ensure_bucket()
        .await
        .context("Failed to prepare storage bucket")?;
    let storage = Arc::new(storage);

    let queue = Arc::new(
        RabbitMqService::new(
            &config.rabbitmq_url,
            ConsumerSettings {
                ack_mode: config.ack_mode,
                prefetch: u16::try_from(config.max_concurrent_jobs).unwrap_or(u16::MAX),
            },
        )
        .await?,
    );

    let pipeline = Arc::new(Pipeline::new(
        storage.clone(),
        Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone())),
        config.work_dir.clone(),
    ));

    let dispatcher = JobDispatcher::new(config.max_concurrent_jobs);
    dispatcher
        .start(queue.as_ref(), &config.job_queue_name, pipeline)
        .await
        .context("Failed to start job dispatcher")?;
    info!(max_concurrent_jobs = config.max_concurrent_jobs, ack_mode = ?config.ack_mode, "Job dispatcher started");

    let port = config.server_port;
    let state = AppState::new(config, storage, queue);
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Server running on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Completing background tasks...");
    dispatcher.shutdown();
    dispatcher.wait().await;
    info!("Stopped server");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down server");
}

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::infrastructure::queue::{JobQueue, MessageStream, QueueMessage};
use crate::modules::video::events::TranscodeJob;
use crate::modules::video::model::JobId;

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job_id: JobId) -> anyhow::Result<()>;
}

type Registry = Arc<Mutex<HashSet<JobId>>>;

/// Marks a job id as in flight until dropped.
struct InFlightClaim {
    registry: Registry,
    job_id: JobId,
}

impl InFlightClaim {
    fn acquire(registry: &Registry, job_id: JobId) -> Option<Self> {
        let inserted = registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.clone());

        inserted.then(|| Self {
            registry: registry.clone(),
            job_id,
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

#[derive(Clone)]
pub struct JobDispatcher {
    limiter: Arc<Semaphore>,
    in_flight: Registry,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl JobDispatcher {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self {
            limiter: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Returns once subscribed; consuming continues in the background.
    pub async fn start(
        &self,
        queue: &dyn JobQueue,
        queue_name: &str,
        handler: Arc<dyn JobHandler>,
    ) -> anyhow::Result<()> {
        let messages = queue.subscribe(queue_name).await?;

        info!("🎥 Transcoder worker listening on '{}'", queue_name);
        self.tracker
            .spawn(self.clone().receive_loop(queue_name.to_string(), messages, handler));
        Ok(())
    }

    /// Stops pulling new messages. Running jobs finish.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn receive_loop(
        self,
        queue_name: String,
        mut messages: MessageStream,
        handler: Arc<dyn JobHandler>,
    ) {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = messages.next() => match next {
                    Some(message) => message,
                    None => {
                        info!(queue = %queue_name, "Consumer stream closed");
                        break;
                    }
                },
            };

            self.dispatch(message, &handler).await;
        }

        info!(queue = %queue_name, "Transcoder worker stopped receiving");
    }

    async fn dispatch(&self, message: QueueMessage, handler: &Arc<dyn JobHandler>) {
        let job_id = match TranscodeJob::from_payload(&message.payload) {
            Ok(job) => job.job_id,
            Err(e) => {
                warn!(
                    payload = %String::from_utf8_lossy(&message.payload),
                    error = %e,
                    "Dropping message with invalid job id"
                );
                settle(message, false).await;
                return;
            }
        };

        info!(job_id = %job_id, "📦 Received transcoding job");

        let Some(claim) = InFlightClaim::acquire(&self.in_flight, job_id.clone()) else {
            warn!(job_id = %job_id, "Job already in flight, dropping duplicate message");
            settle(message, false).await;
            return;
        };

        let permit = tokio::select! {
            _ = self.cancel.cancelled() => {
                // Unsettled deliveries go back to the broker when the channel closes.
                warn!(job_id = %job_id, "Shutting down before job could start");
                return;
            }
            permit = self.limiter.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!(job_id = %job_id, "Job limiter closed: {}", e);
                    return;
                }
            },
        };

        let handler = handler.clone();
        self.tracker.spawn(async move {
            let _permit = permit;
            let _claim = claim;

            // Run the handler in its own task so a panic surfaces as a JoinError here.
            let run = tokio::spawn({
                let job_id = job_id.clone();
                async move { handler.handle(job_id).await }
            });

            let succeeded = match run.await {
                Ok(Ok(())) => {
                    info!(job_id = %job_id, "✅ Job completed successfully");
                    true
                }
                Ok(Err(e)) => {
                    error!(job_id = %job_id, "❌ Failed to process job: {:#}", e);
                    false
                }
                Err(join_err) if join_err.is_panic() => {
                    error!(job_id = %job_id, error = ?join_err, "❌ Job handler panicked");
                    false
                }
                Err(join_err) => {
                    warn!(job_id = %job_id, error = ?join_err, "Job task cancelled");
                    false
                }
            };

            settle(message, succeeded).await;
        });
    }
}

async fn settle(message: QueueMessage, succeeded: bool) {
    if !message.requires_ack() {
        return;
    }

    let result = if succeeded {
        message.ack().await
    } else {
        message.reject().await
    };

    if let Err(e) = result {
        error!("Failed to settle message: {:#}", e);
    }
}

use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::queue::JobQueue;
use crate::infrastructure::storage::BlobStore;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<dyn BlobStore>,
    pub queue: Arc<dyn JobQueue>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            config,
            storage,
            queue,
        }
    }
}

use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

#[cfg(test)]
pub mod memory;
pub mod s3;

pub type BlobReader<'a> = Pin<Box<dyn AsyncRead + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob '{0}' not found")]
    NotFound(String),
    #[error("blob stream i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub struct RetrievedBlob {
    pub body: BlobReader<'static>,
    pub size: u64,
    pub content_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns the stored object's location.
    async fn upload(
        &self,
        name: &str,
        body: BlobReader<'_>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn retrieve(&self, name: &str) -> Result<RetrievedBlob, StorageError>;

    async fn delete(&self, name: &str) -> Result<(), StorageError>;
}

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use super::{BlobReader, BlobStore, RetrievedBlob, StorageError};

#[derive(Clone)]
pub struct StoredBlob {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, StoredBlob>>,
    fail_delete: AtomicBool,
    upload_budget: Mutex<Option<usize>>,
    uploads: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, data: &[u8], content_type: &str) {
        self.blobs.lock().unwrap().insert(
            name.to_string(),
            StoredBlob {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<StoredBlob> {
        self.blobs.lock().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn fail_deletes(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    pub fn fail_uploads_after(&self, successful: usize) {
        *self.upload_budget.lock().unwrap() = Some(successful);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        name: &str,
        mut body: BlobReader<'_>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        {
            let mut budget = self.upload_budget.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(StorageError::Backend("upload rejected".into()));
                }
                *remaining -= 1;
            }
        }

        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        self.insert(name, &data, content_type);
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("memory://{}", name))
    }

    async fn retrieve(&self, name: &str) -> Result<RetrievedBlob, StorageError> {
        let blob = self
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        Ok(RetrievedBlob {
            size: blob.data.len() as u64,
            content_type: blob.content_type,
            body: Box::pin(std::io::Cursor::new(blob.data)),
        })
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("delete rejected".into()));
        }
        self.blobs.lock().unwrap().remove(name);
        Ok(())
    }
}

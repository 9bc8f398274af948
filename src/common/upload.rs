use crate::infrastructure::storage::BlobReader;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_s3::types::CompletedPart;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

// Minimum part size for S3 is 5MB. We use 6MB to be safe.
const MIN_PART_SIZE: usize = 6 * 1024 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

#[async_trait]
pub trait PartStore: Send + Sync {
    async fn put_object(&self, key: &str, content_type: &str, body: Bytes) -> Result<String>;
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String>;
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart>;
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String>;
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;
}

// Objects smaller than one part go out as a single put_object.
pub struct MultipartUploader<'a, S: PartStore + ?Sized> {
    storage: &'a S,
    key: String,
    content_type: String,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    part_number: i32,
    buffer: Vec<u8>,
}

impl<'a, S: PartStore + ?Sized> MultipartUploader<'a, S> {
    pub fn new(storage: &'a S, key: String, content_type: &str) -> Self {
        Self {
            storage,
            key,
            content_type: content_type.to_string(),
            upload_id: None,
            parts: Vec::new(),
            part_number: 1,
            buffer: Vec::with_capacity(MIN_PART_SIZE),
        }
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        self.buffer.extend_from_slice(&chunk);

        if self.buffer.len() >= MIN_PART_SIZE {
            self.flush_part().await?;
        }

        Ok(())
    }

    async fn flush_part(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let upload_id = match &self.upload_id {
            Some(id) => id.clone(),
            None => {
                let id = self
                    .storage
                    .create_multipart_upload(&self.key, &self.content_type)
                    .await
                    .map_err(|e| anyhow!("Failed to initiate upload: {:#}", e))?;
                self.upload_id = Some(id.clone());
                id
            }
        };

        let body = Bytes::from(std::mem::take(&mut self.buffer));
        self.buffer.reserve(MIN_PART_SIZE);

        let part = self
            .storage
            .upload_part(&self.key, &upload_id, self.part_number, body)
            .await
            .map_err(|e| anyhow!("Failed to upload part {}: {:#}", self.part_number, e))?;

        self.parts.push(part);
        self.part_number += 1;

        Ok(())
    }

    pub async fn finish(&mut self) -> Result<String> {
        let Some(upload_id) = self.upload_id.clone() else {
            let body = Bytes::from(std::mem::take(&mut self.buffer));
            return self
                .storage
                .put_object(&self.key, &self.content_type, body)
                .await
                .map_err(|e| anyhow!("Failed to upload object: {:#}", e));
        };

        // Upload remaining buffer as last part
        if !self.buffer.is_empty() {
            self.flush_part().await?;
        }

        self.storage
            .complete_multipart_upload(&self.key, &upload_id, std::mem::take(&mut self.parts))
            .await
            .map_err(|e| anyhow!("Failed to complete upload: {:#}", e))
    }

    pub async fn abort(&self) {
        let Some(upload_id) = &self.upload_id else {
            return;
        };

        if let Err(e) = self.storage.abort_multipart_upload(&self.key, upload_id).await {
            warn!(key = %self.key, upload_id = %upload_id, "Failed to abort upload: {:#}", e);
        }
    }
}

/// Read errors are returned as the original `io::Error`.
pub async fn upload_stream<S: PartStore + ?Sized>(
    storage: &S,
    reader: BlobReader<'_>,
    key: String,
    content_type: &str,
) -> Result<String> {
    let mut uploader = MultipartUploader::new(storage, key, content_type);

    let result = pump(&mut uploader, reader).await;
    if let Err(e) = &result {
        error!("Upload error: {:#}", e);
        uploader.abort().await;
    }
    result
}

async fn pump<S: PartStore + ?Sized>(
    uploader: &mut MultipartUploader<'_, S>,
    reader: BlobReader<'_>,
) -> Result<String> {
    let mut stream = ReaderStream::with_capacity(reader, READ_CHUNK_SIZE);

    while let Some(chunk) = stream.next().await {
        uploader.write_chunk(chunk?).await?;
    }

    uploader.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<String>>,
        fail_complete: bool,
        fail_abort: bool,
    }

    impl RecordingStore {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PartStore for RecordingStore {
        async fn put_object(&self, key: &str, _: &str, body: Bytes) -> Result<String> {
            self.record(format!("put {} {}", key, body.len()));
            Ok(format!("store/{}", key))
        }

        async fn create_multipart_upload(&self, _: &str, _: &str) -> Result<String> {
            self.record("create");
            Ok("upload-1".to_string())
        }

        async fn upload_part(
            &self,
            _: &str,
            _: &str,
            part_number: i32,
            _: Bytes,
        ) -> Result<CompletedPart> {
            self.record(format!("part {}", part_number));
            Ok(CompletedPart::builder().part_number(part_number).build())
        }

        async fn complete_multipart_upload(
            &self,
            key: &str,
            _: &str,
            parts: Vec<CompletedPart>,
        ) -> Result<String> {
            self.record(format!("complete {}", parts.len()));
            if self.fail_complete {
                anyhow::bail!("complete rejected");
            }
            Ok(format!("store/{}", key))
        }

        async fn abort_multipart_upload(&self, _: &str, _: &str) -> Result<()> {
            self.record("abort");
            if self.fail_abort {
                anyhow::bail!("abort rejected");
            }
            Ok(())
        }
    }

    fn reader(data: Vec<u8>) -> BlobReader<'static> {
        Box::pin(io::Cursor::new(data))
    }

    // Yields `data`, then fails.
    fn failing_reader(data: Vec<u8>) -> BlobReader<'static> {
        let chunks = vec![
            Ok(Bytes::from(data)),
            Err(io::Error::new(io::ErrorKind::FileTooLarge, "limit")),
        ];
        Box::pin(tokio_util::io::StreamReader::new(futures_util::stream::iter(chunks)))
    }

    #[tokio::test]
    async fn small_body_is_a_single_put() {
        let store = RecordingStore::default();

        let location = upload_stream(&store, reader(b"#EXTM3U\n".to_vec()), "playlist.m3u8".into(), "application/vnd.apple.mpegurl")
            .await
            .unwrap();

        assert_eq!(location, "store/playlist.m3u8");
        assert_eq!(store.calls(), vec!["put playlist.m3u8 8"]);
    }

    #[tokio::test]
    async fn large_body_is_split_into_parts() {
        let store = RecordingStore::default();

        upload_stream(&store, reader(vec![1u8; MIN_PART_SIZE + 10]), "abc1234567".into(), "video/mp4")
            .await
            .unwrap();

        assert_eq!(store.calls(), vec!["create", "part 1", "part 2", "complete 2"]);
    }

    #[tokio::test]
    async fn failed_complete_aborts_the_upload() {
        let store = RecordingStore {
            fail_complete: true,
            ..RecordingStore::default()
        };

        let err = upload_stream(&store, reader(vec![1u8; MIN_PART_SIZE]), "abc1234567".into(), "video/mp4")
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("complete rejected"));
        assert_eq!(store.calls(), vec!["create", "part 1", "complete 1", "abort"]);
    }

    #[tokio::test]
    async fn read_error_survives_a_failed_abort() {
        let store = RecordingStore {
            fail_abort: true,
            ..RecordingStore::default()
        };

        let err = upload_stream(&store, failing_reader(vec![1u8; MIN_PART_SIZE]), "abc1234567".into(), "video/mp4")
            .await
            .unwrap_err();

        let io_err = err.downcast_ref::<io::Error>().expect("read error kept");
        assert_eq!(io_err.kind(), io::ErrorKind::FileTooLarge);
        assert_eq!(store.calls(), vec!["create", "part 1", "abort"]);
    }

    #[tokio::test]
    async fn read_error_before_any_part_needs_no_abort() {
        let store = RecordingStore::default();

        assert!(upload_stream(&store, failing_reader(b"abc".to_vec()), "abc1234567".into(), "video/mp4")
            .await
            .is_err());
        assert!(store.calls().is_empty());
    }
}

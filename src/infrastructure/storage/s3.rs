use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use bytes::Bytes;
use tracing::info;
use url::Url;

use super::{BlobReader, BlobStore, RetrievedBlob, StorageError};
use crate::common::upload::{upload_stream, PartStore};

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
    endpoint: String,
}

impl StorageService {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!("✅ Connected to S3 (MinIO)");

        Self {
            client,
            bucket: bucket.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Creates the bucket unless it already exists.
    pub async fn ensure_bucket(&self) -> Result<(), aws_sdk_s3::Error> {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
            info!(bucket = %self.bucket, "Bucket already exists");
            return Ok(());
        }

        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await?;

        info!(bucket = %self.bucket, "Bucket created");
        Ok(())
    }

    pub fn location(&self, key: &str) -> String {
        object_location(&self.endpoint, &self.bucket, key)
    }
}

#[async_trait]
impl PartStore for StorageService {
    async fn put_object(&self, key: &str, content_type: &str, body: Bytes) -> anyhow::Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        Ok(self.location(key))
    }

    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> anyhow::Result<String> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        result
            .upload_id
            .ok_or_else(|| anyhow!("multipart upload response carried no upload id"))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> anyhow::Result<CompletedPart> {
        let result = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        Ok(CompletedPart::builder()
            .set_e_tag(result.e_tag)
            .part_number(part_number)
            .build())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> anyhow::Result<String> {
        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        Ok(self.location(key))
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> anyhow::Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        Ok(())
    }
}

/// Path-style URL of an object, as MinIO serves it.
fn object_location(endpoint: &str, bucket: &str, key: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    match Url::parse(&format!("{}/{}/{}", base, bucket, key)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}/{}", bucket, key),
    }
}

#[async_trait]
impl BlobStore for StorageService {
    async fn upload(
        &self,
        name: &str,
        body: BlobReader<'_>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let location = upload_stream(self, body, name.to_string(), content_type)
            .await
            .map_err(|e| match e.downcast::<std::io::Error>() {
                // Reading the body failed, not the store
                Ok(io) => StorageError::Io(io),
                Err(e) => StorageError::Backend(format!("{:#}", e)),
            })?;

        info!(name = %name, location = %location, "Uploaded blob");
        Ok(location)
    }

    async fn retrieve(&self, name: &str) -> Result<RetrievedBlob, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                GetObjectError::NoSuchKey(_) => StorageError::NotFound(name.to_string()),
                other => StorageError::Backend(DisplayErrorContext(&other).to_string()),
            })?;

        let size = resp.content_length().unwrap_or_default().max(0) as u64;
        let content_type = resp
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        Ok(RetrievedBlob {
            body: Box::pin(resp.body.into_async_read()),
            size,
            content_type,
        })
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;

        info!(name = %name, "Deleted blob");
        Ok(())
    }
}

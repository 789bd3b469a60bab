use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::{presigning::PresigningConfig, primitives::ByteStream, Client};
use bytes::Bytes;
use tracing::debug;

use super::{validate_object_path, BlobStore};
use crate::error::StorageError;

/// S3-backed [`BlobStore`].
///
/// Works with AWS S3 and S3-compatible services (MinIO, R2, ...). Read URLs
/// are presigned `GetObject` requests, so objects never need to be public.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    /// Create a store writing to `bucket`, with every key under `prefix`.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        Self {
            client,
            bucket: bucket.into(),
            prefix,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn key_for(&self, path: &str) -> Result<String, StorageError> {
        validate_object_path(path)?;
        if self.prefix.is_empty() {
            Ok(path.to_string())
        } else {
            Ok(format!("{}/{}", self.prefix, path))
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(
        &self,
        data: Bytes,
        path: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = self.key_for(path)?;
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        debug!(bucket = %self.bucket, key = %key, size, "uploaded object");
        Ok(format!("s3://{}/{}", self.bucket, key))
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
        let key = self.key_for(path)?;
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::S3(format!("invalid presign TTL: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}

use crate::keys;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload};
use std::time::Duration;

/// Receipt photos in an S3 bucket (or an S3-compatible endpoint such as MinIO)
///
/// Credentials come from the usual AWS environment variables.
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    /// Unsigned object URLs are `{object_base}/{key}`
    object_base: String,
}

impl S3Storage {
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        let object_base = match endpoint_url {
            Some(endpoint) => {
                let endpoint = endpoint.trim_end_matches('/').to_string();
                builder = builder
                    .with_allow_http(endpoint.starts_with("http://"))
                    .with_endpoint(endpoint.clone());
                format!("{}/{}", endpoint, bucket)
            }
            None => format!("https://{}.s3.{}.amazonaws.com", bucket, region),
        };

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        tracing::debug!(bucket = %bucket, object_base = %object_base, "S3 receipt storage ready");

        Ok(Self {
            store,
            bucket,
            object_base,
        })
    }

    fn object_url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.object_base, storage_key)
    }

    fn location(storage_key: &str) -> StorageResult<Path> {
        keys::validate_key(storage_key)?;
        Ok(Path::from(storage_key))
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<String> {
        let location = Self::location(storage_key)?;
        let size = data.len();
        let start = std::time::Instant::now();

        if let Err(e) = self
            .store
            .put(&location, PutPayload::from(Bytes::from(data)))
            .await
        {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %storage_key,
                size_bytes = size,
                "Receipt photo upload failed"
            );
            return Err(StorageError::UploadFailed(e.to_string()));
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Receipt photo written"
        );
        Ok(self.object_url(storage_key))
    }

    async fn signed_url(&self, storage_key: &str, expires_in: Duration) -> StorageResult<String> {
        let location = Self::location(storage_key)?;
        self.store
            .signed_url(Method::GET, &location, expires_in)
            .await
            .map(|url| url.to_string())
            .map_err(|e| StorageError::BackendError(e.to_string()))
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let location = Self::location(storage_key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

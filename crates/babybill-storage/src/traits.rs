//! Object store seam for receipt photos

use crate::StorageBackend;
use async_trait::async_trait;
use babybill_core::AppError;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid signed URL: {0}")]
    InvalidSignature(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::InvalidSignature(msg) => AppError::Forbidden(msg),
            StorageError::ConfigError(msg) => AppError::Config(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Photos are written once per capture and read only through short-lived
/// signed URLs. Keys are the stable reference; URLs are never persisted.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` under `storage_key`, replacing any previous object.
    /// Returns the unsigned URL.
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Time-limited GET URL for `storage_key`
    async fn signed_url(&self, storage_key: &str, expires_in: Duration) -> StorageResult<String>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;
    use babybill_core::{ErrorClass, ErrorMetadata};

    #[test]
    fn test_storage_errors_map_to_app_errors() {
        let err: AppError = StorageError::UploadFailed("connection reset".to_string()).into();
        assert_eq!(err.class(), ErrorClass::TransientIO);

        let err: AppError = StorageError::InvalidKey("../x.jpg".to_string()).into();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err: AppError = StorageError::InvalidSignature("expired".to_string()).into();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}

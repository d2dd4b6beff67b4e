use babybill_core::constants::SIGNED_URL_TTL_SECS;
use babybill_core::AppError;
use babybill_storage::keys::object_key;
use babybill_storage::Storage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Short-lived fetch URL for a receipt photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedImage {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Resolves stored image keys to signed URLs, freshly on every call
#[derive(Clone)]
pub struct ImageAccess {
    storage: Arc<dyn Storage>,
    ttl: Duration,
}

impl ImageAccess {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_ttl(storage, Duration::from_secs(SIGNED_URL_TTL_SECS))
    }

    pub fn with_ttl(storage: Arc<dyn Storage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    /// `None` when the record has no photo; the caller shows a placeholder.
    pub async fn resolve(&self, image_ref: Option<&str>) -> Result<Option<SignedImage>, AppError> {
        let image_ref = match image_ref.map(str::trim) {
            Some(image_ref) if !image_ref.is_empty() => image_ref,
            _ => return Ok(None),
        };

        let key = object_key(image_ref)?;
        let issued_at = Utc::now();
        let url = self.storage.signed_url(&key, self.ttl).await?;
        let expires_at = issued_at
            + chrono::Duration::from_std(self.ttl)
                .map_err(|e| AppError::Internal(format!("Invalid signed URL lifetime: {}", e)))?;

        tracing::debug!(key = %key, expires_at = %expires_at, "Signed receipt image URL");
        Ok(Some(SignedImage { url, expires_at }))
    }
}

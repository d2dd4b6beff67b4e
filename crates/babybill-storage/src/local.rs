use crate::keys;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Local filesystem storage implementation
///
/// Signed URLs carry `expires` (unix seconds) and `signature`, the hex
/// HMAC-SHA256 of `{key}:{expires}` under the signing key. Whatever serves
/// `base_url` checks them with [`LocalStorage::verify_signature`].
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
    signing_key: Vec<u8>,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "./data/receipts")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:3000/files")
    /// * `signing_key` - Secret for signed URLs; a random per-process key when `None`
    pub async fn new(
        base_path: impl Into<PathBuf>,
        base_url: String,
        signing_key: Option<Vec<u8>>,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let signing_key = match signing_key {
            Some(key) if !key.is_empty() => key,
            _ => {
                tracing::warn!("No local storage signing key configured, signed URLs will not survive a restart");
                Uuid::new_v4().as_bytes().to_vec()
            }
        };

        Ok(LocalStorage {
            base_path,
            base_url,
            signing_key,
        })
    }

    /// Convert storage key to filesystem path with security validation
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        keys::validate_key(storage_key)?;
        Ok(self.base_path.join(storage_key))
    }

    /// Generate unsigned URL for file
    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    fn mac_for(&self, storage_key: &str, expires: i64) -> StorageResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| StorageError::ConfigError(format!("Invalid signing key: {}", e)))?;
        mac.update(storage_key.as_bytes());
        mac.update(b":");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Check a signature produced by [`Storage::signed_url`].
    pub fn verify_signature(
        &self,
        storage_key: &str,
        expires: i64,
        signature: &str,
    ) -> StorageResult<()> {
        let tag = hex::decode(signature)
            .map_err(|_| StorageError::InvalidSignature("Malformed signature".to_string()))?;

        self.mac_for(storage_key, expires)?
            .verify_slice(&tag)
            .map_err(|_| StorageError::InvalidSignature("Signature mismatch".to_string()))?;

        if Utc::now().timestamp() > expires {
            return Err(StorageError::InvalidSignature(
                "Signed URL has expired".to_string(),
            ));
        }
        Ok(())
    }

    /// Check a full signed URL issued by this storage.
    pub fn verify_url(&self, url: &str) -> StorageResult<String> {
        let invalid = || StorageError::InvalidSignature("Not a signed URL".to_string());

        let prefix = format!("{}/", self.base_url.trim_end_matches('/'));
        let rest = url.strip_prefix(&prefix).ok_or_else(invalid)?;
        let (key, query) = rest.split_once('?').ok_or_else(invalid)?;

        let mut expires = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse::<i64>().ok(),
                Some(("signature", v)) => signature = Some(v),
                _ => {}
            }
        }

        let expires = expires.ok_or_else(invalid)?;
        let signature = signature.ok_or_else(invalid)?;
        self.verify_signature(key, expires, signature)?;
        Ok(key.to_string())
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        self.ensure_parent_dir(path).await?;

        let mut file = fs::File::create(path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<String> {
        let path = self.key_to_path(storage_key)?;
        let size = data.len();
        let start = std::time::Instant::now();

        self.write_file(&path, &data).await?;

        tracing::info!(
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Receipt photo written"
        );

        Ok(self.generate_url(storage_key))
    }

    async fn signed_url(&self, storage_key: &str, expires_in: Duration) -> StorageResult<String> {
        self.key_to_path(storage_key)?;

        let expires = Utc::now().timestamp() + expires_in.as_secs() as i64;
        let signature = hex::encode(self.mac_for(storage_key, expires)?.finalize().into_bytes());

        Ok(format!(
            "{}?expires={}&signature={}",
            self.generate_url(storage_key),
            expires,
            signature
        ))
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(storage_key)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn storage(dir: &Path) -> LocalStorage {
        LocalStorage::new(
            dir,
            "http://localhost:3000/files".to_string(),
            Some(b"test-signing-key".to_vec()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_writes_under_the_key() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let key = format!("receipt-images/{}/receipt_1.jpg", Uuid::new_v4());

        assert!(!storage.exists(&key).await.unwrap());
        let url = storage
            .upload_with_key(&key, b"jpeg bytes".to_vec(), "image/jpeg")
            .await
            .unwrap();

        assert_eq!(url, format!("http://localhost:3000/files/{}", key));
        assert!(storage.exists(&key).await.unwrap());
        assert_eq!(
            fs::read(dir.path().join(&key)).await.unwrap(),
            b"jpeg bytes".to_vec()
        );
    }

    #[tokio::test]
    async fn test_upload_with_key_overwrites() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let key = "receipt-images/owner/receipt_1.jpg";

        storage.upload_with_key(key, b"first".to_vec(), "image/jpeg").await.unwrap();
        storage.upload_with_key(key, b"second".to_vec(), "image/jpeg").await.unwrap();

        assert_eq!(fs::read(dir.path().join(key)).await.unwrap(), b"second".to_vec());
    }

    #[tokio::test]
    async fn test_signed_url_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let key = "receipt-images/owner/receipt_3.jpg";

        let url = storage
            .signed_url(key, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.contains("expires="));
        assert_eq!(storage.verify_url(&url).unwrap(), key);

        let tampered = url.replace("receipt_3", "receipt_4");
        assert!(matches!(
            storage.verify_url(&tampered),
            Err(StorageError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_signature_is_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let key = "receipt-images/owner/receipt_5.jpg";

        let expires = Utc::now().timestamp() - 10;
        let signature = hex::encode(storage.mac_for(key, expires).unwrap().finalize().into_bytes());
        assert!(matches!(
            storage.verify_signature(key, expires, &signature),
            Err(StorageError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        assert!(matches!(
            storage
                .upload_with_key("../secret", b"x".to_vec(), "image/jpeg")
                .await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.exists("/etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}

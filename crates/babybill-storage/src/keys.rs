//! Shared key generation for storage backends.
//!
//! Key format: `receipt-images/{owner_id}/{filename}`. Stored image references
//! may be legacy keys, with the bucket prefix (`receipt-images/receipt_1.jpg`) or
//! without it (`receipt_1.jpg`); both resolve to the same object.

use babybill_core::constants::RECEIPT_IMAGE_PREFIX;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Key for one captured photo.
///
/// `capture_id` keeps two captures by the same owner in the same millisecond
/// apart. Allocate it once per capture so retries write the same object.
pub fn receipt_image_key(owner_id: Uuid, captured_at: DateTime<Utc>, capture_id: Uuid) -> String {
    format!(
        "{}/{}/receipt_{}_{}.jpg",
        RECEIPT_IMAGE_PREFIX,
        owner_id,
        captured_at.timestamp_millis(),
        capture_id.simple()
    )
}

/// Resolve a stored image reference to an object key.
pub fn object_key(image_ref: &str) -> StorageResult<String> {
    let trimmed = image_ref.trim();
    validate_key(trimmed)?;

    let prefix = format!("{}/", RECEIPT_IMAGE_PREFIX);
    if trimmed.starts_with(&prefix) {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{}{}", prefix, trimmed))
    }
}

/// Reject keys that could escape the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_receipt_image_key() {
        let owner = Uuid::nil();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let capture = Uuid::from_u128(0xabc);
        assert_eq!(
            receipt_image_key(owner, at, capture),
            "receipt-images/00000000-0000-0000-0000-000000000000/receipt_1704067200000_00000000000000000000000000000abc.jpg"
        );
    }

    #[test]
    fn test_same_instant_captures_get_distinct_keys() {
        let owner = Uuid::new_v4();
        let at = Utc::now();
        let first = receipt_image_key(owner, at, Uuid::new_v4());
        let second = receipt_image_key(owner, at, Uuid::new_v4());
        assert_ne!(first, second);
        assert!(validate_key(&first).is_ok());
    }

    #[test]
    fn test_object_key_accepts_legacy_references() {
        assert_eq!(
            object_key("receipt-images/receipt_1.jpg").unwrap(),
            "receipt-images/receipt_1.jpg"
        );
        assert_eq!(
            object_key("receipt_1.jpg").unwrap(),
            "receipt-images/receipt_1.jpg"
        );
    }

    #[test]
    fn test_object_key_rejects_traversal() {
        assert!(object_key("../etc/passwd").is_err());
        assert!(object_key("/abs/path.jpg").is_err());
        assert!(object_key("  ").is_err());
    }
}

//! BabyBill Storage Library
//!
//! Object storage for receipt photos. It includes the [`Storage`] trait and
//! implementations for the local filesystem and S3.
//!
//! # Storage key format
//!
//! Receipt photos live under the `receipt-images` prefix:
//!
//! - **New uploads**: `receipt-images/{owner_id}/receipt_{unix_millis}_{capture_id}.jpg`
//! - **Legacy rows**: `receipt-images/receipt_{millis}.jpg` or the bare file name
//!
//! Keys must not contain `..` or a leading `/`. Key handling is centralized in the
//! `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use babybill_core::StorageBackend;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};

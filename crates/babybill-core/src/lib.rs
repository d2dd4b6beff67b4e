//! BabyBill Core Library
//!
//! This crate provides the receipt domain models, the money/quantity normalizer,
//! error types, configuration, and validation shared across all BabyBill components.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod money;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, OcrBackend};
pub use error::{AppError, ErrorClass, ErrorMetadata, LogLevel};
pub use money::{parse_amount, parse_quantity};
pub use storage_types::StorageBackend;

//! Error types module
//!
//! All failures the lifecycle manager can surface are unified under [`AppError`].
//! Every variant falls into one of the [`ErrorClass`] buckets:
//!
//! - **TransientIO**: network, store, object-store or OCR failures. Retryable by the
//!   user; the interacting state (draft, captured image) is preserved.
//! - **Fatal**: editing/deleting a record the caller does not own, or an OCR reply
//!   with a malformed structure. The operation is aborted and nothing partial is
//!   persisted.
//! - **Validation**: rejected user input that cannot be defaulted (e.g. a missing
//!   store name on manual entry).
//!
//! Malformed amounts never reach this module: the normalizer defaults them silently.
//!
//! The `Database` variant wraps `sqlx::Error` only when the `sqlx` feature is enabled.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Propagation class of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    TransientIO,
    Fatal,
    Validation,
}

/// Metadata describing how an error should be presented to the interacting user
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "STORE_ERROR")
    fn error_code(&self) -> &'static str;

    /// Propagation class
    fn class(&self) -> ErrorClass;

    /// Whether the user can retry the same action
    fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::TransientIO
    }

    /// Suggested action for the user
    fn suggested_action(&self) -> Option<&'static str>;

    /// User-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from the user
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("OCR service error: {0}")]
    Ocr(String),

    #[error("Malformed OCR response: {0}")]
    MalformedOcr(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, class, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    &'static str,
    ErrorClass,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            "STORE_ERROR",
            ErrorClass::TransientIO,
            Some("Check your connection and try again"),
            true,
            LogLevel::Error,
        ),
        AppError::Storage(_) => (
            "IMAGE_STORE_ERROR",
            ErrorClass::TransientIO,
            Some("Check your connection and try again"),
            true,
            LogLevel::Error,
        ),
        AppError::Ocr(_) => (
            "OCR_ERROR",
            ErrorClass::TransientIO,
            Some("Retry processing the same photo"),
            false,
            LogLevel::Warn,
        ),
        AppError::MalformedOcr(_) => (
            "OCR_MALFORMED",
            ErrorClass::Fatal,
            Some("Enter the receipt manually"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            "INVALID_INPUT",
            ErrorClass::Validation,
            Some("Check the entered values and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            "NOT_FOUND",
            ErrorClass::Fatal,
            Some("Refresh the receipt list"),
            false,
            LogLevel::Debug,
        ),
        AppError::Forbidden(_) => (
            "FORBIDDEN",
            ErrorClass::Fatal,
            None,
            true,
            LogLevel::Warn,
        ),
        AppError::Config(_) => (
            "CONFIG_ERROR",
            ErrorClass::Fatal,
            Some("Check the environment configuration"),
            false,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            "INTERNAL_ERROR",
            ErrorClass::Fatal,
            None,
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    fn class(&self) -> ErrorClass {
        app_error_static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).2
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).4
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Could not reach the receipt store".to_string(),
            AppError::Storage(_) => "Could not reach the image store".to_string(),
            AppError::Ocr(ref msg) => format!("Failed to process receipt: {}", msg),
            AppError::MalformedOcr(_) => "The receipt could not be read".to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Forbidden(_) => "You do not have access to this receipt".to_string(),
            AppError::Config(ref msg) => msg.clone(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Something went wrong".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_recoverable() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.class(), ErrorClass::TransientIO);
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "STORE_ERROR");
        assert!(err.is_sensitive());

        let err = AppError::Ocr("timeout".to_string());
        assert!(err.is_recoverable());
        assert!(err.client_message().contains("timeout"));
    }

    #[test]
    fn test_fatal_errors_are_not_recoverable() {
        let err = AppError::Forbidden("receipt owned by someone else".to_string());
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(!err.is_recoverable());
        assert_eq!(
            err.client_message(),
            "You do not have access to this receipt"
        );

        let err = AppError::MalformedOcr("missing receipt".to_string());
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert_eq!(err.suggested_action(), Some("Enter the receipt manually"));
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = AppError::InvalidInput("Please enter a store name".to_string());
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(err.client_message(), "Please enter a store name");
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let err = AppError::from(anyhow::anyhow!("root cause").context("outer"));
        let details = err.detailed_message();
        assert!(details.contains("Internal error with source"));
        assert!(details.contains("outer"));
    }
}

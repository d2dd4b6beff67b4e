//! Shared constants

/// Bucket prefix used for receipt photos in the object store.
pub const RECEIPT_IMAGE_PREFIX: &str = "receipt-images";

/// Placeholder used when OCR cannot determine a text field.
pub const UNKNOWN: &str = "Unknown";

/// Lifetime of a signed image URL.
pub const SIGNED_URL_TTL_SECS: u64 = 3600;

/// Quiet period before a username availability check is sent.
pub const USERNAME_CHECK_DEBOUNCE_MS: u64 = 500;

pub const USERNAME_MIN_LENGTH: usize = 3;
pub const USERNAME_MAX_LENGTH: usize = 20;
pub const PASSWORD_MIN_LENGTH: usize = 8;

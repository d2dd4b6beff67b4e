//! Configuration module
//!
//! Settings are read from the environment (after loading `.env` via `dotenvy`).
//! Every value has a default except the credentials of optional backends, which
//! `validate()` checks against the selected backend.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::constants::{SIGNED_URL_TTL_SECS, USERNAME_CHECK_DEBOUNCE_MS};
use crate::storage_types::StorageBackend;

const DB_MAX_CONNECTIONS: u32 = 10;
const OCR_API_URL: &str = "http://localhost:5000";
const OCR_TIMEOUT_SECS: u64 = 60;
const ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const LOCAL_STORAGE_PATH: &str = "./data/receipts";
const LOCAL_STORAGE_BASE_URL: &str = "http://localhost:3000/files";

/// OCR backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackend {
    /// Receipt-processing HTTP service (`POST /process-receipt`)
    Http,
    /// Anthropic Messages API with an image block
    Claude,
}

impl FromStr for OcrBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(OcrBackend::Http),
            "claude" | "anthropic" => Ok(OcrBackend::Claude),
            _ => Err(anyhow::anyhow!("Invalid OCR backend: {}", s)),
        }
    }
}

impl Display for OcrBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OcrBackend::Http => write!(f, "http"),
            OcrBackend::Claude => write!(f, "claude"),
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    /// Postgres connection string; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    // Object storage
    pub storage_backend: StorageBackend,
    pub local_storage_path: String,
    pub local_storage_base_url: String,
    pub local_storage_signing_key: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    // OCR
    pub ocr_backend: OcrBackend,
    pub ocr_api_url: String,
    pub ocr_timeout_secs: u64,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    // Client behaviour
    pub signed_url_ttl_secs: u64,
    pub username_check_debounce_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = non_empty("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let storage_backend = match non_empty("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        let ocr_backend = match non_empty("OCR_BACKEND") {
            Some(value) => value.parse::<OcrBackend>()?,
            None => OcrBackend::Http,
        };

        let config = Config {
            environment,
            database_url: non_empty("DATABASE_URL"),
            db_max_connections: non_empty("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DB_MAX_CONNECTIONS),
            storage_backend,
            local_storage_path: non_empty("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|| LOCAL_STORAGE_PATH.to_string()),
            local_storage_base_url: non_empty("LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|| LOCAL_STORAGE_BASE_URL.to_string()),
            local_storage_signing_key: non_empty("LOCAL_STORAGE_SIGNING_KEY"),
            s3_bucket: non_empty("S3_BUCKET"),
            s3_region: non_empty("S3_REGION").or_else(|| non_empty("AWS_REGION")),
            s3_endpoint: non_empty("S3_ENDPOINT"),
            ocr_backend,
            ocr_api_url: non_empty("OCR_API_URL")
                .unwrap_or_else(|| OCR_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            ocr_timeout_secs: non_empty("OCR_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(OCR_TIMEOUT_SECS),
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY"),
            anthropic_model: non_empty("ANTHROPIC_MODEL")
                .unwrap_or_else(|| ANTHROPIC_MODEL.to_string()),
            signed_url_ttl_secs: non_empty("SIGNED_URL_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(SIGNED_URL_TTL_SECS),
            username_check_debounce_ms: non_empty("USERNAME_CHECK_DEBOUNCE_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(USERNAME_CHECK_DEBOUNCE_MS),
        };

        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.db_max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS must be at least 1"));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "STORAGE_BACKEND=s3 requires S3_BUCKET to be set"
                    ));
                }
                if self.s3_region.is_none() && self.s3_endpoint.is_none() {
                    return Err(anyhow::anyhow!(
                        "STORAGE_BACKEND=s3 requires S3_REGION (or AWS_REGION) or S3_ENDPOINT"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.is_production() && self.local_storage_signing_key.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_SIGNING_KEY must be set in production"
                    ));
                }
            }
        }

        if self.ocr_backend == OcrBackend::Claude && self.anthropic_api_key.is_none() {
            return Err(anyhow::anyhow!(
                "OCR_BACKEND=claude requires ANTHROPIC_API_KEY to be set"
            ));
        }

        if self.signed_url_ttl_secs == 0 {
            return Err(anyhow::anyhow!("SIGNED_URL_TTL_SECS must be positive"));
        }

        Ok(())
    }
}

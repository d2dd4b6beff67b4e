//! BabyBill Services Layer
//!
//! Orchestration of the receipt lifecycle on top of the store, object storage
//! and OCR collaborators: capture and ingestion, duplicate detection, in-place
//! editing with revert, the filtered ledger, signed photo access and the
//! registration checks. Collaborators are shared as `Arc<dyn ...>`.

pub mod duplicate;
pub mod image_access;
pub mod ingestion;
pub mod ledger;
pub mod registration;
pub mod sequence;
pub mod session;

pub use duplicate::{DuplicateGuard, DuplicateNotice, SaveOutcome};
pub use image_access::{ImageAccess, SignedImage};
pub use ingestion::{IngestionPipeline, IngestionState, PipelineFailure};
pub use ledger::{filter, CategoryFilter, LedgerView};
pub use registration::{UsernameChecker, UsernameStatus};
pub use sequence::Generation;
pub use session::{EditableSession, ExitDecision, SessionMode};

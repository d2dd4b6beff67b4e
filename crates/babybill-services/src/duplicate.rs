//! Duplicate detection before a new record is inserted
//!
//! The check is advisory: a failed lookup is logged and treated as "not a
//! duplicate" so saving is never blocked by the guard itself.

use babybill_core::models::{DuplicateKey, ReceiptRecord};
use babybill_core::AppError;
use babybill_db::ReceiptStore;
use serde::Serialize;
use std::sync::Arc;

use crate::sequence::Generation;

/// Human-facing description of an existing matching record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateNotice {
    pub key: DuplicateKey,
    pub message: String,
}

impl DuplicateNotice {
    fn new(key: DuplicateKey) -> Self {
        let message = key.notice();
        Self { key, message }
    }
}

/// Result of saving a new record through the guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved(ReceiptRecord),
    /// Nothing was written; the caller may save again with `override_duplicate`.
    Duplicate(DuplicateNotice),
}

#[derive(Clone)]
pub struct DuplicateGuard {
    store: Arc<dyn ReceiptStore>,
    generation: Arc<Generation>,
}

impl DuplicateGuard {
    pub fn new(store: Arc<dyn ReceiptStore>) -> Self {
        Self {
            store,
            generation: Arc::new(Generation::new()),
        }
    }

    /// Exact-match lookup on (owner, merchant, date, total)
    pub async fn is_duplicate(&self, key: &DuplicateKey) -> bool {
        match self.store.exists_by_owner_merchant_date_total(key).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    owner_id = %key.owner_id,
                    "Duplicate lookup failed, continuing as not duplicate"
                );
                false
            }
        }
    }

    /// Like [`is_duplicate`](Self::is_duplicate), but `None` when a newer
    /// check was started while this one was in flight.
    pub async fn check_latest(&self, key: &DuplicateKey) -> Option<bool> {
        let ticket = self.generation.next();
        let duplicate = self.is_duplicate(key).await;
        if self.generation.is_current(ticket) {
            Some(duplicate)
        } else {
            tracing::debug!(ticket, "Dropping stale duplicate check result");
            None
        }
    }

    /// Insert `record` unless it duplicates an existing one.
    ///
    /// With `override_duplicate` the lookup is skipped and the record is
    /// inserted as is.
    pub async fn save_new(
        &self,
        record: ReceiptRecord,
        override_duplicate: bool,
    ) -> Result<SaveOutcome, AppError> {
        let key = DuplicateKey::of(&record);
        self.save_new_against(record, &[key], override_duplicate)
            .await
    }

    /// Insert `record` unless any of `candidates` already exists.
    ///
    /// Candidates are checked in order and the first match is reported.
    pub async fn save_new_against(
        &self,
        record: ReceiptRecord,
        candidates: &[DuplicateKey],
        override_duplicate: bool,
    ) -> Result<SaveOutcome, AppError> {
        if !override_duplicate {
            for (position, key) in candidates.iter().enumerate() {
                if candidates[..position].contains(key) {
                    continue;
                }
                if self.is_duplicate(key).await {
                    tracing::info!(
                        owner_id = %record.owner_id,
                        merchant_name = %key.merchant_name,
                        purchase_date = %key.purchase_date,
                        "Duplicate receipt detected"
                    );
                    return Ok(SaveOutcome::Duplicate(DuplicateNotice::new(key.clone())));
                }
            }
        }

        let saved = self.store.insert(&record).await?;
        tracing::info!(
            owner_id = %saved.owner_id,
            receipt_id = %saved.id,
            overridden = override_duplicate,
            "Receipt saved"
        );
        Ok(SaveOutcome::Saved(saved))
    }
}

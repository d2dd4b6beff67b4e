//! In-place editing of a persisted receipt
//!
//! A session holds two full copies of the record: the `baseline` (last value
//! known to be persisted) and the `draft` being edited. Discarding copies the
//! baseline back over the draft; a successful commit promotes the draft.

use babybill_core::models::{ItemField, ReceiptField, ReceiptRecord};
use babybill_core::AppError;
use babybill_db::ReceiptStore;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Viewing,
    Editing,
}

/// What the caller must do before leaving the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Leave,
    /// Unsaved edits exist; ask before discarding them.
    ConfirmDiscard,
}

pub struct EditableSession {
    store: Arc<dyn ReceiptStore>,
    owner_id: Uuid,
    baseline: ReceiptRecord,
    draft: ReceiptRecord,
    dirty: bool,
    mode: SessionMode,
}

impl EditableSession {
    /// Start viewing `record` on behalf of `owner_id`.
    pub fn new(store: Arc<dyn ReceiptStore>, owner_id: Uuid, record: ReceiptRecord) -> Self {
        Self {
            store,
            owner_id,
            draft: record.clone(),
            baseline: record,
            dirty: false,
            mode: SessionMode::Viewing,
        }
    }

    /// Load a record from the store and start viewing it.
    pub async fn open(
        store: Arc<dyn ReceiptStore>,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Self, AppError> {
        let record = store
            .get(owner_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Receipt {} not found", id)))?;
        Ok(Self::new(store, owner_id, record))
    }

    pub fn baseline(&self) -> &ReceiptRecord {
        &self.baseline
    }

    pub fn draft(&self) -> &ReceiptRecord {
        &self.draft
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Enter Editing from a fresh copy of the baseline.
    ///
    /// A no-op while already Editing, so pending edits survive. Use
    /// [`cancel`](Self::cancel) or [`confirm_discard`](Self::confirm_discard) to drop them.
    pub fn begin_edit(&mut self) {
        if self.mode == SessionMode::Editing {
            return;
        }
        self.draft = self.baseline.clone();
        self.dirty = false;
        self.mode = SessionMode::Editing;
        tracing::debug!(receipt_id = %self.baseline.id, "Editing receipt");
    }

    pub fn set_field(&mut self, field: ReceiptField, value: &str) -> Result<(), AppError> {
        self.ensure_editing()?;
        self.draft.set_field(field, value);
        self.dirty = true;
        Ok(())
    }

    pub fn add_item(&mut self) -> Result<(), AppError> {
        self.ensure_editing()?;
        self.draft.add_item();
        self.dirty = true;
        Ok(())
    }

    pub fn update_item(
        &mut self,
        index: usize,
        field: ItemField,
        value: &str,
    ) -> Result<(), AppError> {
        self.ensure_editing()?;
        self.draft.update_item(index, field, value)?;
        self.dirty = true;
        Ok(())
    }

    pub fn remove_item(&mut self, index: usize) -> Result<(), AppError> {
        self.ensure_editing()?;
        self.draft.remove_item(index)?;
        self.dirty = true;
        Ok(())
    }

    /// Throw away the draft and return to viewing.
    pub fn cancel(&mut self) {
        self.draft = self.baseline.clone();
        self.dirty = false;
        self.mode = SessionMode::Viewing;
        tracing::debug!(receipt_id = %self.baseline.id, "Edit cancelled");
    }

    /// Send the full draft to the store.
    ///
    /// On failure the draft, dirty flag and mode are left as they were so the
    /// user can retry.
    pub async fn commit(&mut self) -> Result<&ReceiptRecord, AppError> {
        self.ensure_editing()?;
        self.ensure_owner()?;

        let start = std::time::Instant::now();
        let patch = self.draft.to_patch();

        let result = self
            .store
            .update(self.owner_id, self.draft.id, &patch)
            .await;

        match result {
            Ok(_) => {
                self.baseline = self.draft.clone();
                self.dirty = false;
                self.mode = SessionMode::Viewing;
                tracing::info!(
                    owner_id = %self.owner_id,
                    receipt_id = %self.baseline.id,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Receipt updated"
                );
                Ok(&self.baseline)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    owner_id = %self.owner_id,
                    receipt_id = %self.draft.id,
                    "Receipt update failed, keeping draft"
                );
                Err(e)
            }
        }
    }

    pub fn request_exit(&self) -> ExitDecision {
        if self.mode == SessionMode::Editing && self.dirty {
            ExitDecision::ConfirmDiscard
        } else {
            ExitDecision::Leave
        }
    }

    pub fn confirm_discard(&mut self) {
        self.cancel();
    }

    /// Hard delete of the record. The photo is left in the object store.
    pub async fn delete(&self) -> Result<(), AppError> {
        self.ensure_owner()?;
        self.store.delete(self.owner_id, self.baseline.id).await?;
        tracing::info!(
            owner_id = %self.owner_id,
            receipt_id = %self.baseline.id,
            "Receipt deleted"
        );
        Ok(())
    }

    fn ensure_editing(&self) -> Result<(), AppError> {
        if self.mode != SessionMode::Editing {
            return Err(AppError::InvalidInput(
                "Receipt is not being edited".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_owner(&self) -> Result<(), AppError> {
        if !self.baseline.is_owned_by(self.owner_id) {
            tracing::warn!(
                owner_id = %self.owner_id,
                receipt_id = %self.baseline.id,
                "Rejected change to a receipt owned by another user"
            );
            return Err(AppError::Forbidden(format!(
                "Receipt {} belongs to another user",
                self.baseline.id
            )));
        }
        Ok(())
    }
}

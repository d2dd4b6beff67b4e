//! Capture → upload → OCR → review → persist
//!
//! One pipeline instance follows one captured photo. The object key is fixed at
//! capture, so a retried upload overwrites the same object. OCR runs at most
//! once per attempt and is never retried automatically.
//!
//! Confirming checks for duplicates against the key OCR recognised and, when
//! review changed it, the edited key as well. Editing the date or total does not
//! hide a receipt that was already scanned.

use babybill_core::models::{DuplicateKey, ItemField, ReceiptField, ReceiptRecord, ReceiptStatus};
use babybill_core::{AppError, ErrorMetadata};
use babybill_ocr::{OcrService, ReceiptGuess};
use babybill_storage::keys::receipt_image_key;
use babybill_storage::Storage;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::duplicate::{DuplicateGuard, DuplicateNotice, SaveOutcome};

const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionState {
    Captured,
    Uploading,
    Processing,
    Review,
    Persisted,
    Failed,
}

/// Why the last attempt stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineFailure {
    pub stage: IngestionState,
    pub message: String,
    /// `false` for an unreadable OCR structure; the photo has to be entered manually.
    pub retryable: bool,
}

pub struct IngestionPipeline {
    storage: Arc<dyn Storage>,
    ocr: Arc<dyn OcrService>,
    guard: DuplicateGuard,
    owner_id: Uuid,
    image: Vec<u8>,
    image_key: String,
    state: IngestionState,
    draft: Option<ReceiptRecord>,
    guessed_key: Option<DuplicateKey>,
    failure: Option<PipelineFailure>,
    pending_duplicate: Option<DuplicateNotice>,
    persisted: Option<ReceiptRecord>,
}

impl IngestionPipeline {
    /// Accept a captured photo. Empty payloads are rejected.
    pub fn capture(
        storage: Arc<dyn Storage>,
        ocr: Arc<dyn OcrService>,
        guard: DuplicateGuard,
        owner_id: Uuid,
        image: Vec<u8>,
    ) -> Result<Self, AppError> {
        if image.is_empty() {
            return Err(AppError::InvalidInput("Captured image is empty".to_string()));
        }

        let image_key = receipt_image_key(owner_id, Utc::now(), Uuid::new_v4());
        tracing::info!(
            owner_id = %owner_id,
            key = %image_key,
            image_size = image.len(),
            "Receipt captured"
        );

        Ok(Self {
            storage,
            ocr,
            guard,
            owner_id,
            image,
            image_key,
            state: IngestionState::Captured,
            draft: None,
            guessed_key: None,
            failure: None,
            pending_duplicate: None,
            persisted: None,
        })
    }

    pub fn state(&self) -> IngestionState {
        self.state
    }

    pub fn image_key(&self) -> &str {
        &self.image_key
    }

    /// The guessed record under review
    pub fn draft(&self) -> Option<&ReceiptRecord> {
        self.draft.as_ref()
    }

    pub fn failure(&self) -> Option<&PipelineFailure> {
        self.failure.as_ref()
    }

    pub fn pending_duplicate(&self) -> Option<&DuplicateNotice> {
        self.pending_duplicate.as_ref()
    }

    pub fn persisted(&self) -> Option<&ReceiptRecord> {
        self.persisted.as_ref()
    }

    /// Upload the photo and run OCR, ending in `Review` or `Failed`.
    pub async fn process(&mut self) -> Result<&ReceiptRecord, AppError> {
        if self.state != IngestionState::Captured {
            return Err(self.wrong_state("process"));
        }

        self.state = IngestionState::Uploading;
        let start = std::time::Instant::now();
        let upload = self
            .storage
            .upload_with_key(&self.image_key, self.image.clone(), IMAGE_CONTENT_TYPE)
            .await;
        if let Err(e) = upload {
            return Err(self.fail(e.into()));
        }
        tracing::info!(
            key = %self.image_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Receipt image uploaded"
        );

        self.state = IngestionState::Processing;
        let start = std::time::Instant::now();
        let recognised = self.ocr.process_receipt(&self.image).await;
        let guess = match recognised {
            Ok(guess) => guess,
            Err(e) => return Err(self.fail(e)),
        };
        tracing::info!(
            backend = self.ocr.name(),
            owner_id = %self.owner_id,
            item_count = guess.items.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Receipt recognised"
        );

        let draft = draft_from_guess(self.owner_id, &self.image_key, guess);
        self.guessed_key = Some(DuplicateKey::of(&draft));
        self.state = IngestionState::Review;
        Ok(self.draft.insert(draft))
    }

    /// Re-enter `Captured` after a retryable failure, keeping the photo and key.
    pub fn retry(&mut self) -> Result<(), AppError> {
        let retryable = match (&self.failure, self.state) {
            (Some(failure), IngestionState::Failed) => failure.retryable,
            _ => return Err(self.wrong_state("retry")),
        };
        if !retryable {
            return Err(AppError::InvalidInput(
                "This receipt could not be read; enter it manually".to_string(),
            ));
        }

        tracing::info!(key = %self.image_key, "Retrying receipt ingestion");
        self.failure = None;
        self.state = IngestionState::Captured;
        Ok(())
    }

    pub fn set_field(&mut self, field: ReceiptField, value: &str) -> Result<(), AppError> {
        self.review_draft()?.set_field(field, value);
        Ok(())
    }

    pub fn add_item(&mut self) -> Result<(), AppError> {
        self.review_draft()?.add_item();
        Ok(())
    }

    pub fn update_item(
        &mut self,
        index: usize,
        field: ItemField,
        value: &str,
    ) -> Result<(), AppError> {
        self.review_draft()?.update_item(index, field, value)
    }

    pub fn remove_item(&mut self, index: usize) -> Result<(), AppError> {
        self.review_draft()?.remove_item(index)
    }

    /// Persist the reviewed draft through the duplicate guard.
    ///
    /// A duplicate keeps the pipeline in `Review` until the caller confirms
    /// again with `override_duplicate`. A failed insert also stays in
    /// `Review` with the draft intact.
    pub async fn confirm(&mut self, override_duplicate: bool) -> Result<SaveOutcome, AppError> {
        let mut record = self.review_draft()?.clone();
        record.status = ReceiptStatus::Completed;

        let mut candidates: Vec<DuplicateKey> = self.guessed_key.iter().cloned().collect();
        candidates.push(DuplicateKey::of(&record));

        let outcome = self
            .guard
            .save_new_against(record, &candidates, override_duplicate)
            .await?;
        match &outcome {
            SaveOutcome::Saved(saved) => {
                self.pending_duplicate = None;
                self.persisted = Some(saved.clone());
                self.state = IngestionState::Persisted;
            }
            SaveOutcome::Duplicate(notice) => {
                self.pending_duplicate = Some(notice.clone());
            }
        }
        Ok(outcome)
    }

    fn review_draft(&mut self) -> Result<&mut ReceiptRecord, AppError> {
        if self.state != IngestionState::Review {
            return Err(self.wrong_state("edit"));
        }
        self.draft
            .as_mut()
            .ok_or_else(|| AppError::Internal("Review without a draft".to_string()))
    }

    fn fail(&mut self, error: AppError) -> AppError {
        let retryable = error.is_recoverable();
        tracing::warn!(
            error = %error,
            stage = ?self.state,
            key = %self.image_key,
            retryable,
            "Receipt ingestion failed"
        );
        self.failure = Some(PipelineFailure {
            stage: self.state,
            message: error.client_message(),
            retryable,
        });
        self.state = IngestionState::Failed;
        error
    }

    fn wrong_state(&self, action: &str) -> AppError {
        AppError::InvalidInput(format!(
            "Cannot {} a receipt in state {:?}",
            action, self.state
        ))
    }
}

fn draft_from_guess(owner_id: Uuid, image_key: &str, guess: ReceiptGuess) -> ReceiptRecord {
    let mut record = ReceiptRecord::new(owner_id);
    record.merchant_name = guess.store_name;
    record.purchase_date = guess.date;
    record.category = guess.category;
    record.payment_method = guess.payment_method;
    record.subtotal = guess.subtotal;
    record.tax = guess.tax;
    record.discount = guess.discount;
    record.total_amount = guess.total_amount;
    record.items = guess.items;
    record.image_ref = Some(image_key.to_string());
    record.raw_ocr_text = guess.raw_text;
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use babybill_core::models::Category;
    use babybill_db::MemoryReceiptStore;
    use babybill_storage::LocalStorage;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    /// Replays queued OCR results, one per call
    struct ScriptedOcr {
        replies: Mutex<VecDeque<Result<ReceiptGuess, AppError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedOcr {
        fn new(replies: Vec<Result<ReceiptGuess, AppError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OcrService for ScriptedOcr {
        async fn process_receipt(&self, _image: &[u8]) -> Result<ReceiptGuess, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Ocr("no scripted reply".to_string())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn costco() -> ReceiptGuess {
        ReceiptGuess::from_value(serde_json::json!({
            "store_name": "Costco",
            "date": "2024-01-01",
            "total_amount": "42.10",
            "category": "Food",
            "items": [{ "name": "Milk", "price": "3.49", "quantity": 2 }],
            "raw_text": "COSTCO WHOLESALE"
        }))
        .unwrap()
    }

    struct Fixture {
        _dir: TempDir,
        storage: Arc<LocalStorage>,
        store: MemoryReceiptStore,
        ocr: Arc<ScriptedOcr>,
        owner: Uuid,
    }

    impl Fixture {
        async fn new(replies: Vec<Result<ReceiptGuess, AppError>>) -> Self {
            let dir = TempDir::new().unwrap();
            let storage = LocalStorage::new(
                dir.path(),
                "http://localhost:3000/files".to_string(),
                Some(b"key".to_vec()),
            )
            .await
            .unwrap();
            Self {
                _dir: dir,
                storage: Arc::new(storage),
                store: MemoryReceiptStore::new(),
                ocr: Arc::new(ScriptedOcr::new(replies)),
                owner: Uuid::new_v4(),
            }
        }

        fn capture(&self, image: &[u8]) -> Result<IngestionPipeline, AppError> {
            IngestionPipeline::capture(
                self.storage.clone(),
                self.ocr.clone(),
                DuplicateGuard::new(Arc::new(self.store.clone())),
                self.owner,
                image.to_vec(),
            )
        }
    }

    #[tokio::test]
    async fn test_empty_capture_is_rejected() {
        let fixture = Fixture::new(vec![]).await;
        assert!(matches!(fixture.capture(b""), Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_happy_path_persists_completed_record() {
        let fixture = Fixture::new(vec![Ok(costco())]).await;
        let mut pipeline = fixture.capture(b"jpeg").unwrap();
        assert_eq!(pipeline.state(), IngestionState::Captured);

        let draft = pipeline.process().await.unwrap();
        assert_eq!(draft.merchant_name, "Costco");
        assert_eq!(draft.status, ReceiptStatus::Pending);
        assert_eq!(pipeline.state(), IngestionState::Review);
        assert!(fixture.storage.exists(pipeline.image_key()).await.unwrap());

        pipeline.set_field(ReceiptField::Category, "Shopping").unwrap();
        let outcome = pipeline.confirm(false).await.unwrap();
        let saved = match outcome {
            SaveOutcome::Saved(saved) => saved,
            other => panic!("expected saved, got {:?}", other),
        };
        assert_eq!(saved.status, ReceiptStatus::Completed);
        assert_eq!(saved.category, Category::Shopping);
        assert_eq!(saved.image_ref.as_deref(), Some(pipeline.image_key()));
        assert_eq!(saved.raw_ocr_text.as_deref(), Some("COSTCO WHOLESALE"));
        assert_eq!(pipeline.state(), IngestionState::Persisted);
        assert_eq!(fixture.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_ocr_failure_retries_same_key_without_recapture() {
        let fixture = Fixture::new(vec![
            Err(AppError::Ocr("Failed to upload image".to_string())),
            Ok(costco()),
        ])
        .await;
        let mut pipeline = fixture.capture(b"jpeg").unwrap();
        let key = pipeline.image_key().to_string();

        assert!(matches!(pipeline.process().await, Err(AppError::Ocr(_))));
        assert_eq!(pipeline.state(), IngestionState::Failed);
        let failure = pipeline.failure().unwrap();
        assert_eq!(failure.stage, IngestionState::Processing);
        assert!(failure.retryable);

        pipeline.retry().unwrap();
        assert_eq!(pipeline.state(), IngestionState::Captured);
        pipeline.process().await.unwrap();

        assert_eq!(pipeline.image_key(), key);
        assert_eq!(pipeline.state(), IngestionState::Review);
        assert_eq!(fixture.ocr.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_ocr_cannot_be_retried() {
        let fixture = Fixture::new(vec![Err(AppError::MalformedOcr("garbled".to_string()))]).await;
        let mut pipeline = fixture.capture(b"jpeg").unwrap();

        assert!(matches!(
            pipeline.process().await,
            Err(AppError::MalformedOcr(_))
        ));
        assert!(!pipeline.failure().unwrap().retryable);
        assert!(matches!(pipeline.retry(), Err(AppError::InvalidInput(_))));
        assert!(fixture.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_insert_keeps_review_draft() {
        let fixture = Fixture::new(vec![Ok(costco())]).await;
        let mut pipeline = fixture.capture(b"jpeg").unwrap();
        pipeline.process().await.unwrap();
        pipeline.set_field(ReceiptField::Notes, "office snacks").unwrap();

        fixture.store.set_unavailable(true);
        assert!(matches!(
            pipeline.confirm(true).await,
            Err(AppError::Database(_))
        ));
        assert_eq!(pipeline.state(), IngestionState::Review);
        assert_eq!(pipeline.draft().unwrap().notes, "office snacks");

        fixture.store.set_unavailable(false);
        assert!(matches!(
            pipeline.confirm(true).await.unwrap(),
            SaveOutcome::Saved(_)
        ));
    }

    #[tokio::test]
    async fn test_recognised_duplicate_is_flagged_after_edit() {
        let fixture = Fixture::new(vec![Ok(costco())]).await;
        let mut existing = ReceiptRecord::new(fixture.owner);
        existing.set_field(ReceiptField::MerchantName, "Costco");
        existing.set_field(ReceiptField::PurchaseDate, "2024-01-01");
        existing.set_field(ReceiptField::TotalAmount, "42.10");
        fixture.store.add_record(existing).await;

        let mut pipeline = fixture.capture(b"jpeg").unwrap();
        pipeline.process().await.unwrap();
        pipeline
            .set_field(ReceiptField::PurchaseDate, "2024-01-08")
            .unwrap();

        match pipeline.confirm(false).await.unwrap() {
            SaveOutcome::Duplicate(notice) => {
                assert_eq!(notice.key.purchase_date, "2024-01-01")
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(pipeline.state(), IngestionState::Review);

        let saved = match pipeline.confirm(true).await.unwrap() {
            SaveOutcome::Saved(saved) => saved,
            other => panic!("expected saved, got {:?}", other),
        };
        assert_eq!(saved.purchase_date, "2024-01-08");
    }

    #[tokio::test]
    async fn test_edited_key_is_also_checked() {
        let fixture = Fixture::new(vec![Ok(costco())]).await;
        let mut existing = ReceiptRecord::new(fixture.owner);
        existing.set_field(ReceiptField::MerchantName, "Costco");
        existing.set_field(ReceiptField::PurchaseDate, "2024-01-08");
        existing.set_field(ReceiptField::TotalAmount, "42.10");
        fixture.store.add_record(existing).await;

        let mut pipeline = fixture.capture(b"jpeg").unwrap();
        pipeline.process().await.unwrap();
        pipeline
            .set_field(ReceiptField::PurchaseDate, "2024-01-08")
            .unwrap();

        assert!(matches!(
            pipeline.confirm(false).await.unwrap(),
            SaveOutcome::Duplicate(_)
        ));
    }

    #[tokio::test]
    async fn test_edits_outside_review_are_rejected() {
        let fixture = Fixture::new(vec![Ok(costco())]).await;
        let mut pipeline = fixture.capture(b"jpeg").unwrap();
        assert!(matches!(pipeline.add_item(), Err(AppError::InvalidInput(_))));
        assert!(matches!(pipeline.retry(), Err(AppError::InvalidInput(_))));

        pipeline.process().await.unwrap();
        assert!(matches!(
            pipeline.process().await,
            Err(AppError::InvalidInput(_))
        ));
        pipeline.add_item().unwrap();
        pipeline.update_item(1, ItemField::Name, "Eggs").unwrap();
        pipeline.remove_item(0).unwrap();
        assert_eq!(pipeline.draft().unwrap().items[0].name, "Eggs");
    }
}

//! End-to-end receipt flows over the in-process store and local storage

use async_trait::async_trait;
use babybill_core::models::{
    Category, ManualItem, ManualReceiptForm, ReceiptField, ReceiptRecord, ReceiptStatus,
};
use babybill_core::AppError;
use babybill_db::{MemoryReceiptStore, ReceiptStore};
use babybill_ocr::{OcrService, ReceiptGuess};
use babybill_services::{
    CategoryFilter, DuplicateGuard, EditableSession, ImageAccess, IngestionPipeline,
    IngestionState, LedgerView, SaveOutcome,
};
use babybill_storage::{LocalStorage, Storage};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Always recognises the same Costco receipt
struct CostcoOcr;

#[async_trait]
impl OcrService for CostcoOcr {
    async fn process_receipt(&self, _image: &[u8]) -> Result<ReceiptGuess, AppError> {
        ReceiptGuess::from_value(serde_json::json!({
            "store_name": "Costco",
            "date": "2024-01-01",
            "total_amount": "42.10",
            "subtotal": "40.00",
            "tax": "2.10",
            "category": "Food",
            "items": [
                { "name": "Rotisserie Chicken", "price": "4.99", "quantity": 1 },
                { "name": "Milk", "price": "3.49", "quantity": "2" }
            ],
            "raw_text": "COSTCO WHOLESALE\nTOTAL 42.10"
        }))
    }

    fn name(&self) -> &str {
        "costco"
    }
}

async fn local_storage(dir: &TempDir) -> Arc<LocalStorage> {
    Arc::new(
        LocalStorage::new(
            dir.path(),
            "http://localhost:3000/files".to_string(),
            Some(b"scenario-key".to_vec()),
        )
        .await
        .unwrap(),
    )
}

fn existing_costco(owner: Uuid) -> ReceiptRecord {
    let mut record = ReceiptRecord::new(owner);
    record.set_field(ReceiptField::MerchantName, "Costco");
    record.set_field(ReceiptField::PurchaseDate, "2024-01-01");
    record.set_field(ReceiptField::TotalAmount, "42.10");
    record.status = ReceiptStatus::Completed;
    record
}

#[tokio::test]
async fn scanned_duplicate_is_flagged_then_saved_on_override() {
    let dir = TempDir::new().unwrap();
    let storage = local_storage(&dir).await;
    let store = MemoryReceiptStore::new();
    let owner = Uuid::new_v4();
    store.add_record(existing_costco(owner)).await;

    let mut pipeline = IngestionPipeline::capture(
        storage.clone(),
        Arc::new(CostcoOcr),
        DuplicateGuard::new(Arc::new(store.clone())),
        owner,
        b"\xFF\xD8\xFF\xE0 receipt photo".to_vec(),
    )
    .unwrap();

    let draft = pipeline.process().await.unwrap();
    assert_eq!(draft.merchant_name, "Costco");
    assert_eq!(draft.total_amount.to_string(), "42.10");
    assert_eq!(draft.items.len(), 2);
    assert!(storage.exists(pipeline.image_key()).await.unwrap());

    match pipeline.confirm(false).await.unwrap() {
        SaveOutcome::Duplicate(notice) => assert_eq!(
            notice.message,
            "A receipt from Costco on 2024-01-01 for $42.10 already exists."
        ),
        other => panic!("expected a duplicate, got {:?}", other),
    }
    assert_eq!(pipeline.state(), IngestionState::Review);
    assert!(pipeline.pending_duplicate().is_some());
    assert_eq!(store.len().await, 1);

    let saved = match pipeline.confirm(true).await.unwrap() {
        SaveOutcome::Saved(saved) => saved,
        other => panic!("expected a save, got {:?}", other),
    };
    assert_eq!(pipeline.state(), IngestionState::Persisted);
    assert!(pipeline.pending_duplicate().is_none());
    assert_eq!(saved.status, ReceiptStatus::Completed);
    assert_eq!(saved.image_ref.as_deref(), Some(pipeline.image_key()));
    assert_eq!(store.len().await, 2);

    let access = ImageAccess::new(storage.clone());
    let signed = access
        .resolve(saved.image_ref.as_deref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        storage.verify_url(&signed.url).unwrap(),
        pipeline.image_key()
    );
}

#[tokio::test]
async fn editing_the_date_in_review_still_flags_the_scanned_duplicate() {
    let dir = TempDir::new().unwrap();
    let store = MemoryReceiptStore::new();
    let owner = Uuid::new_v4();
    store.add_record(existing_costco(owner)).await;

    let mut pipeline = IngestionPipeline::capture(
        local_storage(&dir).await,
        Arc::new(CostcoOcr),
        DuplicateGuard::new(Arc::new(store.clone())),
        owner,
        b"photo".to_vec(),
    )
    .unwrap();
    pipeline.process().await.unwrap();
    pipeline
        .set_field(ReceiptField::PurchaseDate, "2024-01-08")
        .unwrap();

    assert!(matches!(
        pipeline.confirm(false).await.unwrap(),
        SaveOutcome::Duplicate(_)
    ));
    assert_eq!(store.len().await, 1);

    assert!(matches!(
        pipeline.confirm(true).await.unwrap(),
        SaveOutcome::Saved(_)
    ));
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn manual_entry_edit_and_ledger() {
    let store = MemoryReceiptStore::new();
    let shared: Arc<dyn ReceiptStore> = Arc::new(store.clone());
    let owner = Uuid::new_v4();
    let guard = DuplicateGuard::new(shared.clone());

    let form = ManualReceiptForm {
        store_name: "Walmart".to_string(),
        date: "2024-02-03".to_string(),
        category: "Shopping".to_string(),
        total_amount: "18".to_string(),
        items: vec![ManualItem {
            name: "Socks".to_string(),
            price: "6.00".to_string(),
            quantity: "3".to_string(),
        }],
        ..ManualReceiptForm::default()
    };
    let record = form.clone().into_record(owner).unwrap();
    let saved = match guard.save_new(record, false).await.unwrap() {
        SaveOutcome::Saved(saved) => saved,
        other => panic!("expected a save, got {:?}", other),
    };

    let again = form.into_record(owner).unwrap();
    assert!(matches!(
        guard.save_new(again, false).await.unwrap(),
        SaveOutcome::Duplicate(_)
    ));

    let mut session = EditableSession::open(shared.clone(), owner, saved.id)
        .await
        .unwrap();
    session.begin_edit();
    session
        .set_field(ReceiptField::MerchantName, "Walmart Supercenter")
        .unwrap();
    session.commit().await.unwrap();

    let mut view = LedgerView::load(shared.as_ref(), owner).await.unwrap();
    view.set_search("supercenter");
    view.set_category(CategoryFilter::Only(Category::Shopping));
    assert_eq!(view.visible_count(), 1);
    assert_eq!(view.visible_total().to_string(), "18.00");

    view.set_category(CategoryFilter::Only(Category::Food));
    assert_eq!(view.visible_count(), 0);
}

#[tokio::test]
async fn back_to_back_captures_keep_their_own_photos() {
    let dir = TempDir::new().unwrap();
    let storage = local_storage(&dir).await;
    let store = MemoryReceiptStore::new();
    let owner = Uuid::new_v4();
    let guard = DuplicateGuard::new(Arc::new(store.clone()));

    let mut first = IngestionPipeline::capture(
        storage.clone(),
        Arc::new(CostcoOcr),
        guard.clone(),
        owner,
        b"PHOTO-A".to_vec(),
    )
    .unwrap();
    let mut second = IngestionPipeline::capture(
        storage.clone(),
        Arc::new(CostcoOcr),
        guard,
        owner,
        b"PHOTO-B".to_vec(),
    )
    .unwrap();
    assert_ne!(first.image_key(), second.image_key());

    first.process().await.unwrap();
    second.process().await.unwrap();
    first.confirm(true).await.unwrap();
    second.confirm(true).await.unwrap();

    for (pipeline, photo) in [(&first, b"PHOTO-A"), (&second, b"PHOTO-B")] {
        let saved = pipeline.persisted().unwrap();
        let key = saved.image_ref.as_deref().unwrap();
        assert_eq!(key, pipeline.image_key());
        assert_eq!(
            tokio::fs::read(dir.path().join(key)).await.unwrap(),
            photo.to_vec()
        );
    }
    assert_eq!(store.len().await, 2);
}

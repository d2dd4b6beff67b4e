//! In-process store implementations
//!
//! Used by tests and by the CLI when no `DATABASE_URL` is configured. Both
//! stores can be switched to "unavailable" to exercise transient failures.

use async_trait::async_trait;
use babybill_core::models::{DuplicateKey, ReceiptPatch, ReceiptRecord};
use babybill_core::AppError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::db::profile::UsernameDirectory;
use crate::db::receipt::ReceiptStore;

fn unavailable() -> AppError {
    AppError::Database(sqlx::Error::PoolTimedOut)
}

/// In-memory receipt store
#[derive(Clone, Default)]
pub struct MemoryReceiptStore {
    records: Arc<RwLock<Vec<ReceiptRecord>>>,
    unavailable: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    latency: Duration,
}

impl MemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed a record without going through `insert`
    pub async fn add_record(&self, record: ReceiptRecord) {
        self.records.write().await.push(record);
    }

    /// Make every subsequent call fail with a transient store error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of store calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn enter(&self) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl ReceiptStore for MemoryReceiptStore {
    async fn insert(&self, record: &ReceiptRecord) -> Result<ReceiptRecord, AppError> {
        self.enter().await?;
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(AppError::InvalidInput(format!(
                "Receipt {} already exists",
                record.id
            )));
        }
        records.push(record.clone());
        Ok(record.clone())
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &ReceiptPatch,
    ) -> Result<ReceiptRecord, AppError> {
        self.enter().await?;
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id && r.owner_id == owner_id)
            .ok_or_else(|| AppError::NotFound(format!("Receipt {} not found", id)))?;
        record.apply_patch(patch);
        Ok(record.clone())
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<(), AppError> {
        self.enter().await?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !(r.id == id && r.owner_id == owner_id));
        if records.len() == before {
            return Err(AppError::NotFound(format!("Receipt {} not found", id)));
        }
        Ok(())
    }

    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Option<ReceiptRecord>, AppError> {
        self.enter().await?;
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.id == id && r.owner_id == owner_id)
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<ReceiptRecord>, AppError> {
        self.enter().await?;
        let mut owned: Vec<ReceiptRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn exists_by_owner_merchant_date_total(
        &self,
        key: &DuplicateKey,
    ) -> Result<bool, AppError> {
        self.enter().await?;
        Ok(self
            .records
            .read()
            .await
            .iter()
            .any(|r| DuplicateKey::of(r) == *key))
    }
}

/// In-memory username directory
#[derive(Clone, Default)]
pub struct MemoryUsernameDirectory {
    taken: Arc<Mutex<HashSet<String>>>,
    checked: Arc<Mutex<Vec<String>>>,
    latency: Duration,
    unavailable: Arc<AtomicBool>,
}

impl MemoryUsernameDirectory {
    pub fn new<I, S>(taken: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let taken = taken
            .into_iter()
            .map(|s| s.as_ref().to_lowercase())
            .collect();
        Self {
            taken: Arc::new(Mutex::new(taken)),
            ..Self::default()
        }
    }

    /// Delay every lookup by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn claim(&self, username: &str) {
        self.taken.lock().await.insert(username.to_lowercase());
    }

    /// Candidates looked up so far, in call order
    pub async fn checked(&self) -> Vec<String> {
        self.checked.lock().await.clone()
    }
}

#[async_trait]
impl UsernameDirectory for MemoryUsernameDirectory {
    async fn is_available(&self, candidate: &str) -> Result<bool, AppError> {
        self.checked.lock().await.push(candidate.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(!self.taken.lock().await.contains(&candidate.to_lowercase()))
    }
}

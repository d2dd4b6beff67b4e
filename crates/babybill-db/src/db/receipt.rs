use async_trait::async_trait;
use babybill_core::models::{
    Category, DuplicateKey, LineItem, ReceiptPatch, ReceiptRecord, ReceiptStatus,
};
use babybill_core::money::canonical_amount;
use babybill_core::AppError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// External keyed record store for receipts
///
/// Every operation is scoped to the owner; a row belonging to someone else is
/// indistinguishable from a missing row.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Persist a new record and return it as stored
    async fn insert(&self, record: &ReceiptRecord) -> Result<ReceiptRecord, AppError>;

    /// Overwrite the editable fields of an existing record (last writer wins)
    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &ReceiptPatch,
    ) -> Result<ReceiptRecord, AppError>;

    /// Hard delete
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<(), AppError>;

    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Option<ReceiptRecord>, AppError>;

    /// All records of an owner, newest first
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<ReceiptRecord>, AppError>;

    /// Exact match on (owner, merchant, date, total)
    async fn exists_by_owner_merchant_date_total(
        &self,
        key: &DuplicateKey,
    ) -> Result<bool, AppError>;
}

const RECEIPT_COLUMNS: &str = r#"
    id, user_id, store_name, date, category, payment_method,
    subtotal, tax, discount, total_amount, items, notes,
    status, image_url, raw_text, created_at
"#;

/// Postgres-backed receipt repository
#[derive(Clone)]
pub struct PgReceiptRepository {
    pool: PgPool,
}

impl PgReceiptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn items_to_json(items: &[LineItem]) -> Result<serde_json::Value, AppError> {
    Ok(serde_json::to_value(items)?)
}

fn row_to_record(row: &PgRow) -> Result<ReceiptRecord, AppError> {
    let items: serde_json::Value = row.try_get("items")?;
    // Legacy rows may hold malformed cells; the lenient item decoder defaults them.
    let items: Vec<LineItem> = match items {
        serde_json::Value::Null => Vec::new(),
        value => serde_json::from_value(value)?,
    };

    let category: String = row.try_get("category")?;
    let status: String = row.try_get("status")?;
    let subtotal: Decimal = row.try_get("subtotal")?;
    let tax: Decimal = row.try_get("tax")?;
    let discount: Decimal = row.try_get("discount")?;
    let total_amount: Decimal = row.try_get("total_amount")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(ReceiptRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("user_id")?,
        merchant_name: row.try_get("store_name")?,
        purchase_date: row.try_get("date")?,
        category: Category::from_lenient(&category),
        payment_method: row.try_get("payment_method")?,
        subtotal: canonical_amount(subtotal),
        tax: canonical_amount(tax),
        discount: canonical_amount(discount),
        total_amount: canonical_amount(total_amount),
        items,
        notes: row.try_get("notes")?,
        status: status.parse::<ReceiptStatus>()?,
        image_ref: row.try_get("image_url")?,
        raw_ocr_text: row.try_get("raw_text")?,
        created_at,
    })
}

#[async_trait]
impl ReceiptStore for PgReceiptRepository {
    #[tracing::instrument(skip(self, record), fields(owner_id = %record.owner_id, receipt_id = %record.id))]
    async fn insert(&self, record: &ReceiptRecord) -> Result<ReceiptRecord, AppError> {
        let start = std::time::Instant::now();
        let query = format!(
            r#"
            INSERT INTO receipts (
                id, user_id, store_name, date, category, payment_method,
                subtotal, tax, discount, total_amount, items, notes,
                status, image_url, raw_text, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {}
            "#,
            RECEIPT_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(record.id)
            .bind(record.owner_id)
            .bind(&record.merchant_name)
            .bind(&record.purchase_date)
            .bind(record.category.as_str())
            .bind(&record.payment_method)
            .bind(record.subtotal)
            .bind(record.tax)
            .bind(record.discount)
            .bind(record.total_amount)
            .bind(items_to_json(&record.items)?)
            .bind(&record.notes)
            .bind(record.status.as_str())
            .bind(&record.image_ref)
            .bind(&record.raw_ocr_text)
            .bind(record.created_at)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Receipt inserted"
        );

        row_to_record(&row)
    }

    #[tracing::instrument(skip(self, patch), fields(owner_id = %owner_id, receipt_id = %id))]
    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &ReceiptPatch,
    ) -> Result<ReceiptRecord, AppError> {
        let query = format!(
            r#"
            UPDATE receipts
            SET store_name = $3, date = $4, category = $5, payment_method = $6,
                subtotal = $7, tax = $8, discount = $9, total_amount = $10,
                items = $11, notes = $12, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            RECEIPT_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(id)
            .bind(owner_id)
            .bind(&patch.merchant_name)
            .bind(&patch.purchase_date)
            .bind(patch.category.as_str())
            .bind(&patch.payment_method)
            .bind(patch.subtotal)
            .bind(patch.tax)
            .bind(patch.discount)
            .bind(patch.total_amount)
            .bind(items_to_json(&patch.items)?)
            .bind(&patch.notes)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_record(&row),
            None => Err(AppError::NotFound(format!("Receipt {} not found", id))),
        }
    }

    #[tracing::instrument(skip(self), fields(owner_id = %owner_id, receipt_id = %id))]
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM receipts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Receipt {} not found", id)));
        }
        Ok(())
    }

    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Option<ReceiptRecord>, AppError> {
        let query = format!(
            "SELECT {} FROM receipts WHERE id = $1 AND user_id = $2",
            RECEIPT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<ReceiptRecord>, AppError> {
        let query = format!(
            "SELECT {} FROM receipts WHERE user_id = $1 ORDER BY created_at DESC",
            RECEIPT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn exists_by_owner_merchant_date_total(
        &self,
        key: &DuplicateKey,
    ) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM receipts
                WHERE user_id = $1 AND store_name = $2 AND date = $3 AND total_amount = $4
            )
            "#,
        )
        .bind(key.owner_id)
        .bind(&key.merchant_name)
        .bind(&key.purchase_date)
        .bind(key.total_amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

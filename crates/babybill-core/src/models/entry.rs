use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::UNKNOWN;
use crate::error::AppError;
use crate::models::receipt::{Category, LineItem, ReceiptRecord, ReceiptStatus};
use crate::money::{format_amount, parse_amount, parse_quantity};

/// Free-text item row of the manual entry form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualItem {
    pub name: String,
    pub price: String,
    pub quantity: String,
}

/// Manual entry form, exactly as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualReceiptForm {
    pub store_name: String,
    pub date: String,
    pub category: String,
    pub payment_method: String,
    pub subtotal: String,
    pub tax: String,
    pub discount: String,
    pub total_amount: String,
    pub notes: String,
    pub items: Vec<ManualItem>,
}

impl ManualReceiptForm {
    /// Normalize the form into a completed record.
    ///
    /// A blank store name is the only rejected input. Blank dates fall back to today,
    /// blank payment methods to `Unknown`, and item rows without a name are dropped.
    pub fn into_record(self, owner_id: Uuid) -> Result<ReceiptRecord, AppError> {
        let store_name = self.store_name.trim();
        if store_name.is_empty() {
            return Err(AppError::InvalidInput(
                "Please enter a store name".to_string(),
            ));
        }

        let date = match self.date.trim() {
            "" => Utc::now().date_naive().format("%Y-%m-%d").to_string(),
            d => d.to_string(),
        };
        let payment_method = match self.payment_method.trim() {
            "" => UNKNOWN.to_string(),
            p => p.to_string(),
        };

        let items = self
            .items
            .iter()
            .filter(|item| !item.name.trim().is_empty())
            .map(|item| LineItem {
                name: item.name.trim().to_string(),
                unit_price: parse_amount(&item.price),
                quantity: parse_quantity(&item.quantity),
            })
            .collect();

        let mut record = ReceiptRecord::new(owner_id);
        record.merchant_name = store_name.to_string();
        record.purchase_date = date;
        record.category = Category::from_lenient(&self.category);
        record.payment_method = payment_method;
        record.subtotal = parse_amount(&self.subtotal);
        record.tax = parse_amount(&self.tax);
        record.discount = parse_amount(&self.discount);
        record.total_amount = parse_amount(&self.total_amount);
        record.items = items;
        record.notes = self.notes;
        record.status = ReceiptStatus::Completed;
        Ok(record)
    }
}

/// Exact-match identity used to flag a re-entered purchase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DuplicateKey {
    pub owner_id: Uuid,
    pub merchant_name: String,
    pub purchase_date: String,
    pub total_amount: Decimal,
}

impl DuplicateKey {
    pub fn of(record: &ReceiptRecord) -> Self {
        Self {
            owner_id: record.owner_id,
            merchant_name: record.merchant_name.clone(),
            purchase_date: record.purchase_date.clone(),
            total_amount: record.total_amount,
        }
    }

    /// Message shown when the key already exists.
    pub fn notice(&self) -> String {
        format!(
            "A receipt from {} on {} for ${} already exists.",
            self.merchant_name,
            self.purchase_date,
            format_amount(self.total_amount)
        )
    }
}

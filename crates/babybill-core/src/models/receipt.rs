use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;
use crate::money::{self, lenient, parse_amount, parse_quantity, sum_amounts};

/// Spending category of a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Food,
    Bills,
    Gas,
    Shopping,
    Medical,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Food,
        Category::Bills,
        Category::Gas,
        Category::Shopping,
        Category::Medical,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Bills => "Bills",
            Category::Gas => "Gas",
            Category::Shopping => "Shopping",
            Category::Medical => "Medical",
            Category::Other => "Other",
        }
    }

    /// Parse a category, falling back to `Other` for anything unrecognised.
    pub fn from_lenient(s: &str) -> Category {
        s.parse().unwrap_or(Category::Other)
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Other
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.as_deref().map(Category::from_lenient).unwrap_or_default())
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown category: {}", s)))
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a receipt record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Pending,
    Completed,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Pending => "pending",
            ReceiptStatus::Completed => "completed",
        }
    }
}

impl FromStr for ReceiptStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReceiptStatus::Pending),
            "completed" => Ok(ReceiptStatus::Completed),
            _ => Err(AppError::InvalidInput(format!("Unknown status: {}", s))),
        }
    }
}

/// One purchased line on a receipt.
///
/// `quantity >= 1` and `unit_price >= 0` hold by construction: every entry path
/// goes through the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "price", default = "money::zero_amount", deserialize_with = "lenient::amount")]
    pub unit_price: Decimal,
    #[serde(default = "default_quantity", deserialize_with = "lenient::quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl LineItem {
    pub fn new(name: impl Into<String>, unit_price: &str, quantity: &str) -> Self {
        Self {
            name: name.into(),
            unit_price: parse_amount(unit_price),
            quantity: parse_quantity(quantity),
        }
    }

    /// Blank row added by the editor.
    pub fn blank() -> Self {
        Self {
            name: String::new(),
            unit_price: money::zero_amount(),
            quantity: 1,
        }
    }

    /// `unit_price * quantity`, saturating at `Decimal::MAX`.
    pub fn line_total(&self) -> Decimal {
        self.unit_price
            .checked_mul(Decimal::from(self.quantity))
            .unwrap_or(Decimal::MAX)
    }

    /// Apply a text edit to one field, returning the updated item.
    pub fn with_field(&self, field: ItemField, value: &str) -> LineItem {
        let mut item = self.clone();
        match field {
            ItemField::Name => item.name = value.to_string(),
            ItemField::UnitPrice => item.unit_price = parse_amount(value),
            ItemField::Quantity => item.quantity = parse_quantity(value),
        }
        item
    }
}

/// Editable fields of a line item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    Name,
    UnitPrice,
    Quantity,
}

impl FromStr for ItemField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(ItemField::Name),
            "price" | "unit_price" => Ok(ItemField::UnitPrice),
            "quantity" | "qty" => Ok(ItemField::Quantity),
            _ => Err(AppError::InvalidInput(format!("Unknown item field: {}", s))),
        }
    }
}

/// Editable top-level fields of a receipt record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptField {
    MerchantName,
    PurchaseDate,
    Category,
    PaymentMethod,
    Subtotal,
    Tax,
    Discount,
    TotalAmount,
    Notes,
}

impl FromStr for ReceiptField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "store_name" | "merchant" | "merchant_name" => Ok(ReceiptField::MerchantName),
            "date" | "purchase_date" => Ok(ReceiptField::PurchaseDate),
            "category" => Ok(ReceiptField::Category),
            "payment_method" | "payment" => Ok(ReceiptField::PaymentMethod),
            "subtotal" => Ok(ReceiptField::Subtotal),
            "tax" => Ok(ReceiptField::Tax),
            "discount" => Ok(ReceiptField::Discount),
            "total" | "total_amount" => Ok(ReceiptField::TotalAmount),
            "notes" => Ok(ReceiptField::Notes),
            _ => Err(AppError::InvalidInput(format!("Unknown field: {}", s))),
        }
    }
}

/// Canonical receipt record
///
/// `total_amount` is declared by the user or OCR and is never recomputed from
/// `subtotal - discount + tax`. `image_ref` is a storage key, never a fetch URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub id: Uuid,
    #[serde(rename = "user_id")]
    pub owner_id: Uuid,
    #[serde(rename = "store_name", default)]
    pub merchant_name: String,
    #[serde(rename = "date", default)]
    pub purchase_date: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default = "money::zero_amount", deserialize_with = "lenient::amount")]
    pub subtotal: Decimal,
    #[serde(default = "money::zero_amount", deserialize_with = "lenient::amount")]
    pub tax: Decimal,
    #[serde(default = "money::zero_amount", deserialize_with = "lenient::amount")]
    pub discount: Decimal,
    #[serde(default = "money::zero_amount", deserialize_with = "lenient::amount")]
    pub total_amount: Decimal,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub notes: String,
    pub status: ReceiptStatus,
    #[serde(rename = "image_url", default)]
    pub image_ref: Option<String>,
    #[serde(rename = "raw_text", default)]
    pub raw_ocr_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReceiptRecord {
    /// Empty record for an owner, stamped now.
    pub fn new(owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            merchant_name: String::new(),
            purchase_date: Utc::now().date_naive().format("%Y-%m-%d").to_string(),
            category: Category::Other,
            payment_method: String::new(),
            subtotal: money::zero_amount(),
            tax: money::zero_amount(),
            discount: money::zero_amount(),
            total_amount: money::zero_amount(),
            items: Vec::new(),
            notes: String::new(),
            status: ReceiptStatus::Pending,
            image_ref: None,
            raw_ocr_text: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, owner_id: Uuid) -> bool {
        self.owner_id == owner_id
    }

    /// Sum of `unit_price * quantity` over the items, for display only.
    pub fn items_total(&self) -> Decimal {
        sum_amounts(self.items.iter().map(LineItem::line_total))
    }

    /// Apply a text edit to a top-level field.
    pub fn set_field(&mut self, field: ReceiptField, value: &str) {
        match field {
            ReceiptField::MerchantName => self.merchant_name = value.to_string(),
            ReceiptField::PurchaseDate => self.purchase_date = value.to_string(),
            ReceiptField::Category => self.category = Category::from_lenient(value),
            ReceiptField::PaymentMethod => self.payment_method = value.to_string(),
            ReceiptField::Subtotal => self.subtotal = parse_amount(value),
            ReceiptField::Tax => self.tax = parse_amount(value),
            ReceiptField::Discount => self.discount = parse_amount(value),
            ReceiptField::TotalAmount => self.total_amount = parse_amount(value),
            ReceiptField::Notes => self.notes = value.to_string(),
        }
    }

    /// Append a blank item row.
    pub fn add_item(&mut self) {
        let mut items = Vec::with_capacity(self.items.len() + 1);
        items.extend(self.items.iter().cloned());
        items.push(LineItem::blank());
        self.items = items;
    }

    /// Replace one field of the item at `index` with a freshly built sequence.
    pub fn update_item(&mut self, index: usize, field: ItemField, value: &str) -> Result<(), AppError> {
        self.check_item_index(index)?;
        self.items = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if i == index {
                    item.with_field(field, value)
                } else {
                    item.clone()
                }
            })
            .collect();
        Ok(())
    }

    /// Drop the item at `index`, keeping the order of the rest.
    pub fn remove_item(&mut self, index: usize) -> Result<(), AppError> {
        self.check_item_index(index)?;
        self.items = self
            .items
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, item)| item.clone())
            .collect();
        Ok(())
    }

    fn check_item_index(&self, index: usize) -> Result<(), AppError> {
        if index >= self.items.len() {
            return Err(AppError::InvalidInput(format!(
                "Item {} does not exist ({} items)",
                index,
                self.items.len()
            )));
        }
        Ok(())
    }

    /// The editable subset sent to the store on update.
    pub fn to_patch(&self) -> ReceiptPatch {
        ReceiptPatch {
            merchant_name: self.merchant_name.clone(),
            purchase_date: self.purchase_date.clone(),
            category: self.category,
            payment_method: self.payment_method.clone(),
            subtotal: self.subtotal,
            tax: self.tax,
            discount: self.discount,
            total_amount: self.total_amount,
            items: self.items.clone(),
            notes: self.notes.clone(),
        }
    }

    /// Copy the patched fields onto this record.
    pub fn apply_patch(&mut self, patch: &ReceiptPatch) {
        self.merchant_name = patch.merchant_name.clone();
        self.purchase_date = patch.purchase_date.clone();
        self.category = patch.category;
        self.payment_method = patch.payment_method.clone();
        self.subtotal = patch.subtotal;
        self.tax = patch.tax;
        self.discount = patch.discount;
        self.total_amount = patch.total_amount;
        self.items = patch.items.clone();
        self.notes = patch.notes.clone();
    }
}

/// Fields written by an update (identity, provenance and status are immutable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPatch {
    #[serde(rename = "store_name")]
    pub merchant_name: String,
    #[serde(rename = "date")]
    pub purchase_date: String,
    pub category: Category,
    pub payment_method: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total_amount: Decimal,
    pub items: Vec<LineItem>,
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sample() -> ReceiptRecord {
        let mut record = ReceiptRecord::new(Uuid::new_v4());
        record.items = vec![
            LineItem::new("Milk", "3.49", "2"),
            LineItem::new("Bread", "2.00", "1"),
            LineItem::new("Eggs", "4.10", "1"),
        ];
        record
    }

    #[test]
    fn test_category_parsing_is_case_insensitive() {
        assert_eq!("food".parse::<Category>().unwrap(), Category::Food);
        assert_eq!(" MEDICAL ".parse::<Category>().unwrap(), Category::Medical);
        assert!("Groceries".parse::<Category>().is_err());
        assert_eq!(Category::from_lenient("Groceries"), Category::Other);
    }

    #[test]
    fn test_set_field_normalizes_amounts() {
        let mut record = sample();
        record.set_field(ReceiptField::TotalAmount, "42.1");
        record.set_field(ReceiptField::Tax, "oops");
        record.set_field(ReceiptField::Category, "gas");
        assert_eq!(record.total_amount, dec("42.10"));
        assert_eq!(record.tax, dec("0.00"));
        assert_eq!(record.category, Category::Gas);
    }

    #[test]
    fn test_update_item_preserves_order() {
        let mut record = sample();
        record.update_item(1, ItemField::UnitPrice, "2.50").unwrap();
        record.update_item(1, ItemField::Quantity, "x").unwrap();
        let names: Vec<&str> = record.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Milk", "Bread", "Eggs"]);
        assert_eq!(record.items[1].unit_price, dec("2.50"));
        assert_eq!(record.items[1].quantity, 1);
    }

    #[test]
    fn test_remove_item_keeps_remaining_order() {
        let mut record = sample();
        record.remove_item(0).unwrap();
        let names: Vec<&str> = record.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Bread", "Eggs"]);
    }

    #[test]
    fn test_item_index_out_of_range() {
        let mut record = sample();
        assert!(matches!(
            record.update_item(3, ItemField::Name, "x"),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(record.remove_item(9), Err(AppError::InvalidInput(_))));
        assert_eq!(record.items.len(), 3);
    }

    #[test]
    fn test_add_item_appends_blank_row() {
        let mut record = sample();
        record.add_item();
        assert_eq!(record.items.len(), 4);
        assert_eq!(record.items[3], LineItem::blank());
    }

    #[test]
    fn test_items_total_is_display_only() {
        let mut record = sample();
        record.set_field(ReceiptField::TotalAmount, "1.00");
        assert_eq!(record.items_total(), dec("13.08"));
        assert_eq!(record.total_amount, dec("1.00"));
    }

    #[test]
    fn test_items_total_does_not_overflow() {
        let mut record = sample();
        record.items = vec![
            LineItem {
                name: "Gold".to_string(),
                unit_price: Decimal::MAX,
                quantity: 4_000_000_000,
            };
            2
        ];
        assert_eq!(record.items[0].line_total(), Decimal::MAX);
        assert_eq!(record.items_total(), Decimal::MAX);

        record.update_item(0, ItemField::UnitPrice, "79228162514264337593543950").unwrap();
        assert_eq!(record.items[0].unit_price.to_string(), "0.00");
    }

    #[test]
    fn test_deserialize_legacy_row() {
        let row = json!({
            "id": "6f0c3f5e-4c1a-4f3e-9c55-0d7f2b3a1e10",
            "user_id": "1b6f3c1e-9f59-4a2e-8d7e-2a3c4b5d6e7f",
            "store_name": "Costco",
            "date": "2024-01-01",
            "category": "Groceries",
            "total_amount": "42.10",
            "items": [{"name": "Milk", "price": 3.5, "quantity": "2"}, {"name": "Bad", "price": "n/a"}],
            "status": "completed",
            "image_url": "receipt-images/receipt_1.jpg",
            "raw_text": "COSTCO\n42.10",
            "created_at": "2024-01-01T10:00:00Z"
        });
        let record: ReceiptRecord = serde_json::from_value(row).unwrap();
        assert_eq!(record.merchant_name, "Costco");
        assert_eq!(record.category, Category::Other);
        assert_eq!(record.total_amount, dec("42.10"));
        assert_eq!(record.subtotal, dec("0.00"));
        assert_eq!(record.items[0].unit_price, dec("3.50"));
        assert_eq!(record.items[0].quantity, 2);
        assert_eq!(record.items[1].unit_price, dec("0.00"));
        assert_eq!(record.items[1].quantity, 1);
        assert_eq!(record.status, ReceiptStatus::Completed);
        assert_eq!(record.image_ref.as_deref(), Some("receipt-images/receipt_1.jpg"));
    }

    #[test]
    fn test_patch_roundtrip_onto_record() {
        let original = sample();
        let mut edited = original.clone();
        edited.set_field(ReceiptField::MerchantName, "Walmart");
        edited.set_field(ReceiptField::Notes, "weekly shop");

        let mut target = original.clone();
        target.apply_patch(&edited.to_patch());
        assert_eq!(target, edited);
    }
}

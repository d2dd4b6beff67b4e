//! Client-side view over an owner's receipts

use babybill_core::models::{Category, ReceiptRecord};
use babybill_core::money::sum_amounts;
use babybill_core::AppError;
use babybill_db::ReceiptStore;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Category tag selected in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => *wanted == category,
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(CategoryFilter::All);
        }
        Category::from_str(s).map(CategoryFilter::Only)
    }
}

impl Display for CategoryFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CategoryFilter::All => write!(f, "All"),
            CategoryFilter::Only(category) => write!(f, "{}", category),
        }
    }
}

fn matches_search(record: &ReceiptRecord, search_lower: &str) -> bool {
    search_lower.is_empty() || record.merchant_name.to_lowercase().contains(search_lower)
}

/// Records whose merchant contains `search` (case-insensitive) and whose
/// category passes `category`, in their original order.
pub fn filter<'a>(
    records: &'a [ReceiptRecord],
    search: &str,
    category: CategoryFilter,
) -> Vec<&'a ReceiptRecord> {
    let search_lower = search.to_lowercase();
    records
        .iter()
        .filter(|r| matches_search(r, &search_lower) && category.matches(r.category))
        .collect()
}

/// Loaded ledger plus the current search text and category tag
#[derive(Debug, Clone, Default)]
pub struct LedgerView {
    records: Vec<ReceiptRecord>,
    search: String,
    category: CategoryFilter,
}

impl LedgerView {
    /// Build a view from records in any order; they are sorted newest first once.
    pub fn new(mut records: Vec<ReceiptRecord>) -> Self {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self {
            records,
            ..Self::default()
        }
    }

    pub async fn load(store: &dyn ReceiptStore, owner_id: Uuid) -> Result<Self, AppError> {
        let records = store.list_by_owner(owner_id).await?;
        tracing::debug!(owner_id = %owner_id, count = records.len(), "Loaded ledger");
        Ok(Self::new(records))
    }

    /// Replace the loaded records, keeping the current search and category.
    pub fn reload(&mut self, records: Vec<ReceiptRecord>) {
        let Self { search, category, .. } = std::mem::take(self);
        *self = Self {
            search,
            category,
            ..Self::new(records)
        };
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
    }

    pub fn set_category(&mut self, category: CategoryFilter) {
        self.category = category;
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn category(&self) -> CategoryFilter {
        self.category
    }

    pub fn records(&self) -> &[ReceiptRecord] {
        &self.records
    }

    pub fn visible(&self) -> Vec<&ReceiptRecord> {
        filter(&self.records, &self.search, self.category)
    }

    pub fn visible_count(&self) -> usize {
        self.visible().len()
    }

    /// Sum of the declared totals of the visible records
    pub fn visible_total(&self) -> Decimal {
        sum_amounts(self.visible().iter().map(|r| r.total_amount))
    }
}

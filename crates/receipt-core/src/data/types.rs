//! Basic types for the receipt pipeline

use serde::{Deserialize, Serialize};

use crate::data::errors::ResolutionError;

/// One line item as delivered by the receipt scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRow {
    pub receipt_id: String,
    pub price: f64,
    pub product_abbr: String,
}

impl ScanRow {
    pub fn new(receipt_id: impl Into<String>, price: f64, product_abbr: impl Into<String>) -> Self {
        Self {
            receipt_id: receipt_id.into(),
            price,
            product_abbr: product_abbr.into(),
        }
    }
}

/// The record the completion model is asked to produce.
///
/// This is the single definition of the answer schema: the few-shot examples in the
/// prompt are serialized from it and the parser reads the same field names back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionAnswer {
    pub product_name: String,
    pub category_main: String,
    pub category_sub: String,
}

impl CompletionAnswer {
    pub fn new(
        product_name: impl Into<String>,
        category_main: impl Into<String>,
        category_sub: impl Into<String>,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            category_main: category_main.into(),
            category_sub: category_sub.into(),
        }
    }

    /// Canonical JSON field names, in prompt order.
    pub const FIELD_NAMES: [&'static str; 3] = ["productName", "categoryMain", "categorySub"];
}

/// A receipt abbreviation resolved to a full product name and a catalog category pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedItem {
    /// The abbreviated string exactly as it was sent to the resolver.
    pub product_abbr: String,
    pub product_name: String,
    pub category_main: String,
    pub category_sub: String,
}

impl ResolvedItem {
    pub fn from_answer(answer: CompletionAnswer, product_abbr: impl Into<String>) -> Self {
        Self {
            product_abbr: product_abbr.into(),
            product_name: answer.product_name,
            category_main: answer.category_main,
            category_sub: answer.category_sub,
        }
    }
}

/// Resolved item together with the embedding of its augmented text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedItem {
    pub item: ResolvedItem,
    pub embedding: Vec<f32>,
}

/// Final persisted row: scan metadata joined with the embedded item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub receipt_id: String,
    pub price: f64,
    pub product_abbr: String,
    pub product_name: String,
    pub category_main: String,
    pub category_sub: String,
    pub embedding: Vec<f32>,
}

impl ReceiptRecord {
    pub fn join(row: &ScanRow, embedded: EmbeddedItem) -> Self {
        Self {
            receipt_id: row.receipt_id.clone(),
            price: row.price,
            product_abbr: embedded.item.product_abbr,
            product_name: embedded.item.product_name,
            category_main: embedded.item.category_main,
            category_sub: embedded.item.category_sub,
            embedding: embedded.embedding,
        }
    }
}

/// A record as returned by a store, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: ReceiptRecord,
}

/// A stored record and its distance to a query vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: i64,
    pub distance: f32,
    #[serde(flatten)]
    pub record: ReceiptRecord,
}

/// One product of the store's assortment, as listed before embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub name: String,
    pub price: f64,
    pub category: String,
}

impl ProductEntry {
    pub fn new(name: impl Into<String>, price: f64, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price,
            category: category.into(),
        }
    }
}

/// Assortment product with the embedding of its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub price: f64,
    pub category: String,
    pub embedding: Vec<f32>,
}

impl ProductRecord {
    pub fn from_entry(entry: &ProductEntry, embedding: Vec<f32>) -> Self {
        Self {
            name: entry.name.clone(),
            price: entry.price,
            category: entry.category.clone(),
            embedding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProduct {
    pub id: i64,
    #[serde(flatten)]
    pub record: ProductRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredProduct {
    pub id: i64,
    pub distance: f32,
    #[serde(flatten)]
    pub record: ProductRecord,
}

/// Resolution failure of one item, kept at the item's position in the batch.
#[derive(Debug)]
pub struct ItemFailure {
    pub index: usize,
    pub product_abbr: String,
    pub error: ResolutionError,
}

/// A scan row whose item could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRow {
    pub receipt_id: String,
    pub price: f64,
    pub product_abbr: String,
    pub reason: String,
}

impl FailedRow {
    pub fn from_failure(row: &ScanRow, failure: &ItemFailure) -> Self {
        Self {
            receipt_id: row.receipt_id.clone(),
            price: row.price,
            product_abbr: row.product_abbr.clone(),
            reason: failure.error.to_string(),
        }
    }
}

/// Pipeline result for one scan row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Embedded(ReceiptRecord),
    Failed(FailedRow),
}

impl RowOutcome {
    pub fn product_abbr(&self) -> &str {
        match self {
            RowOutcome::Embedded(record) => &record.product_abbr,
            RowOutcome::Failed(row) => &row.product_abbr,
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, RowOutcome::Embedded(_))
    }
}

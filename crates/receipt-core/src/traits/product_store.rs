//! ProductStore trait definition for the embedded store assortment

use async_trait::async_trait;

use crate::data::{ProductRecord, ScoredProduct, StorageError, StoredProduct};
use crate::traits::DistanceMetric;

/// Persistence for the store's product assortment, searched alongside receipts.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert_products(&self, products: &[ProductRecord]) -> Result<usize, StorageError>;

    async fn all_products(&self) -> Result<Vec<StoredProduct>, StorageError>;

    /// Returns the `k` products closest to `query`, nearest first.
    async fn nearest_products(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredProduct>, StorageError>;
}

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::data::{
    ProductRecord, ReceiptRecord, ScoredProduct, ScoredRecord, StorageError, StoredProduct,
    StoredRecord,
};
use crate::storage::rank_nearest;
use crate::traits::{DistanceMetric, ProductStore, ReceiptStore};

fn check_dimension(expected: usize, actual: usize) -> Result<(), StorageError> {
    if actual != expected {
        return Err(StorageError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// In-memory receipt store with brute-force nearest-neighbour search
#[derive(Clone)]
pub struct MemoryReceiptStore {
    dimension: usize,
    records: Arc<RwLock<Vec<StoredRecord>>>,
}

impl MemoryReceiptStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ReceiptStore for MemoryReceiptStore {
    async fn insert_records(&self, records: &[ReceiptRecord]) -> Result<usize, StorageError> {
        // All or nothing: validate before touching the table
        for record in records {
            check_dimension(self.dimension, record.embedding.len())?;
        }

        let mut stored = self.records.write();
        let first_id = stored.len() as i64 + 1;
        stored.extend(records.iter().enumerate().map(|(offset, record)| StoredRecord {
            id: first_id + offset as i64,
            record: record.clone(),
        }));
        debug!(inserted = records.len(), total = stored.len(), "Stored receipt records");
        Ok(records.len())
    }

    async fn all_records(&self) -> Result<Vec<StoredRecord>, StorageError> {
        Ok(self.records.read().clone())
    }

    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredRecord>, StorageError> {
        check_dimension(self.dimension, query.len())?;

        let stored = self.records.read();
        let entries = stored
            .iter()
            .map(|stored| (stored.id, stored.record.embedding.as_slice(), &stored.record));
        let hits: Vec<ScoredRecord> = rank_nearest(entries, query, k, metric)
            .into_iter()
            .map(|(id, distance, record)| ScoredRecord {
                id,
                distance,
                record: record.clone(),
            })
            .collect();
        Ok(hits)
    }
}

/// In-memory product assortment, the counterpart of [`MemoryReceiptStore`]
#[derive(Clone)]
pub struct MemoryProductStore {
    dimension: usize,
    products: Arc<RwLock<Vec<StoredProduct>>>,
}

impl MemoryProductStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            products: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.products.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.read().is_empty()
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn insert_products(&self, products: &[ProductRecord]) -> Result<usize, StorageError> {
        for product in products {
            check_dimension(self.dimension, product.embedding.len())?;
        }

        let mut stored = self.products.write();
        let first_id = stored.len() as i64 + 1;
        stored.extend(products.iter().enumerate().map(|(offset, product)| StoredProduct {
            id: first_id + offset as i64,
            record: product.clone(),
        }));
        debug!(inserted = products.len(), total = stored.len(), "Stored products");
        Ok(products.len())
    }

    async fn all_products(&self) -> Result<Vec<StoredProduct>, StorageError> {
        Ok(self.products.read().clone())
    }

    async fn nearest_products(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredProduct>, StorageError> {
        check_dimension(self.dimension, query.len())?;

        let stored = self.products.read();
        let entries = stored
            .iter()
            .map(|stored| (stored.id, stored.record.embedding.as_slice(), &stored.record));
        let hits: Vec<ScoredProduct> = rank_nearest(entries, query, k, metric)
            .into_iter()
            .map(|(id, distance, record)| ScoredProduct {
                id,
                distance,
                record: record.clone(),
            })
            .collect();
        Ok(hits)
    }
}

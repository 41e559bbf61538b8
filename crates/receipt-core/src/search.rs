//! Semantic search over stored receipt rows and the store assortment.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::data::{ScoredProduct, ScoredRecord, SearchError};
use crate::traits::{DistanceMetric, EmbeddingService, ProductStore, ReceiptStore};

/// Which table a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTarget {
    #[default]
    Receipts,
    Products,
}

impl fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchTarget::Receipts => write!(f, "receipts"),
            SearchTarget::Products => write!(f, "products"),
        }
    }
}

impl FromStr for SearchTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "receipts" => Ok(SearchTarget::Receipts),
            "products" => Ok(SearchTarget::Products),
            other => Err(format!("unknown search target: {other}")),
        }
    }
}

pub struct SemanticSearch {
    embedding: Arc<dyn EmbeddingService>,
    receipts: Option<Arc<dyn ReceiptStore>>,
    products: Option<Arc<dyn ProductStore>>,
    metric: DistanceMetric,
}

impl SemanticSearch {
    /// Search over receipt rows.
    pub fn new(embedding: Arc<dyn EmbeddingService>, store: Arc<dyn ReceiptStore>) -> Self {
        Self {
            embedding,
            receipts: Some(store),
            products: None,
            metric: DistanceMetric::default(),
        }
    }

    /// Search over the product assortment only.
    pub fn for_products(embedding: Arc<dyn EmbeddingService>, store: Arc<dyn ProductStore>) -> Self {
        Self {
            embedding,
            receipts: None,
            products: Some(store),
            metric: DistanceMetric::default(),
        }
    }

    pub fn with_products(mut self, store: Arc<dyn ProductStore>) -> Self {
        self.products = Some(store);
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    async fn embed_query(&self, query_text: &str) -> Result<Vec<f32>, SearchError> {
        let query = self.embedding.embed_text(query_text).await?;
        if query.is_empty() {
            return Err(SearchError::EmptyQueryEmbedding);
        }
        Ok(query)
    }

    /// Returns the `k` stored rows closest to `query_text`, nearest first.
    #[instrument(skip(self), fields(metric = %self.metric))]
    pub async fn search(&self, query_text: &str, k: usize) -> Result<Vec<ScoredRecord>, SearchError> {
        let store = self
            .receipts
            .as_ref()
            .ok_or(SearchError::TargetUnavailable(SearchTarget::Receipts))?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embed_query(query_text).await?;
        let hits = store.nearest(&query, k, self.metric).await?;
        debug!(hits = hits.len(), "Search finished");
        Ok(hits)
    }

    /// Returns the `k` assortment products closest to `query_text`, nearest first.
    #[instrument(skip(self), fields(metric = %self.metric))]
    pub async fn search_products(
        &self,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<ScoredProduct>, SearchError> {
        let store = self
            .products
            .as_ref()
            .ok_or(SearchError::TargetUnavailable(SearchTarget::Products))?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embed_query(query_text).await?;
        let hits = store.nearest_products(&query, k, self.metric).await?;
        debug!(hits = hits.len(), "Product search finished");
        Ok(hits)
    }
}

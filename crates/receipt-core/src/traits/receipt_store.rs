//! ReceiptStore trait definition for persisted receipt rows

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data::{ReceiptRecord, ScoredRecord, StorageError, StoredRecord};

/// Distance used for nearest-neighbour queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::L2 => write!(f, "l2"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

/// Persistence for finished receipt rows.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Inserts all records; returns the number written.
    async fn insert_records(&self, records: &[ReceiptRecord]) -> Result<usize, StorageError>;

    /// Returns every stored row in insertion order.
    async fn all_records(&self) -> Result<Vec<StoredRecord>, StorageError>;

    /// Returns the `k` rows closest to `query`, nearest first.
    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredRecord>, StorageError>;
}

//! Store assortment import.
//!
//! Products are embedded by name alone so that a search can be matched against
//! the shelf as well as against the resolved receipt rows.

use tracing::{info, instrument};

use crate::config::PipelineConfig;
use crate::data::{AlignmentError, PipelineError, ProductEntry, ProductRecord};
use crate::embedding::{create_embedding_service, ChunkedEmbedder, EmbeddingServiceConfig};
use crate::traits::ProductStore;

/// Text that gets embedded for a product.
pub fn product_text(entry: &ProductEntry) -> String {
    entry.name.trim().to_string()
}

pub struct ProductImporter {
    embedder: ChunkedEmbedder,
}

impl ProductImporter {
    pub fn new(embedder: ChunkedEmbedder) -> Self {
        Self { embedder }
    }

    /// Uses the Mistral embedding endpoint with the configured chunk size and retries.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let embedding = create_embedding_service(EmbeddingServiceConfig::Mistral {
            config: config.mistral_config()?,
            model: config.embedding_model.clone(),
        })?;
        let embedder =
            ChunkedEmbedder::new(embedding, config.chunk_size).with_retry(config.retry.clone());
        Ok(Self::new(embedder))
    }

    /// Embeds every entry; the result is in input order.
    pub async fn embed(&self, entries: &[ProductEntry]) -> Result<Vec<ProductRecord>, PipelineError> {
        let texts: Vec<String> = entries.iter().map(product_text).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != entries.len() {
            return Err(AlignmentError::EmbeddingCountMismatch {
                expected: entries.len(),
                actual: vectors.len(),
            }
            .into());
        }

        Ok(entries
            .iter()
            .zip(vectors)
            .map(|(entry, embedding)| ProductRecord::from_entry(entry, embedding))
            .collect())
    }

    #[instrument(skip_all, fields(products = entries.len()))]
    pub async fn import(
        &self,
        entries: &[ProductEntry],
        store: &dyn ProductStore,
    ) -> Result<usize, PipelineError> {
        let records = self.embed(entries).await?;
        let inserted = store.insert_products(&records).await?;
        info!(inserted, "Imported products");
        Ok(inserted)
    }
}

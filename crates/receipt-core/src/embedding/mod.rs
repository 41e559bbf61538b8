//! Embedding client: chunked, order-preserving embedding of many texts.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::mistral::{MistralConfig, MistralEmbeddingService};
use crate::data::{ConfigError, EmbeddingError};
use crate::resilience::{retry, RetryPolicy};
use crate::traits::EmbeddingService;

/// Embeds `texts` with one request per consecutive chunk of at most `chunk_size` texts.
///
/// The result has one vector per input, in input order. Any failing chunk fails the
/// whole call.
pub async fn embed_in_chunks(
    service: &dyn EmbeddingService,
    texts: &[String],
    chunk_size: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    embed_chunks(service, texts, chunk_size, &RetryPolicy::none()).await
}

async fn embed_chunks(
    service: &dyn EmbeddingService,
    texts: &[String],
    chunk_size: usize,
    policy: &RetryPolicy,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if chunk_size == 0 {
        return Err(EmbeddingError::InvalidChunkSize);
    }

    let mut embeddings = Vec::with_capacity(texts.len());
    for (chunk_index, chunk) in texts.chunks(chunk_size).enumerate() {
        debug!(chunk = chunk_index, size = chunk.len(), "Requesting embeddings");
        let vectors = retry(policy, "embedding", EmbeddingError::is_retryable, || {
            service.embed_batch(chunk)
        })
        .await
        .map_err(|e| e.in_chunk(chunk_index))?;

        if vectors.len() != chunk.len() {
            return Err(EmbeddingError::CountMismatch {
                chunk: chunk_index,
                expected: chunk.len(),
                actual: vectors.len(),
            });
        }
        embeddings.extend(vectors);
    }
    Ok(embeddings)
}

/// An embedding service bound to a chunk size and a per-chunk retry policy.
#[derive(Clone)]
pub struct ChunkedEmbedder {
    service: Arc<dyn EmbeddingService>,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl ChunkedEmbedder {
    pub fn new(service: Arc<dyn EmbeddingService>, chunk_size: usize) -> Self {
        Self {
            service,
            chunk_size,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn service(&self) -> &Arc<dyn EmbeddingService> {
        &self.service
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = embed_chunks(self.service.as_ref(), texts, self.chunk_size, &self.retry).await?;
        info!(
            texts = texts.len(),
            chunks = texts.len().div_ceil(self.chunk_size),
            "Embedded texts"
        );
        Ok(vectors)
    }
}

/// Deterministic embeddings for tests and offline runs.
#[derive(Debug, Clone)]
pub struct MockEmbeddingService {
    embedding_dimension: usize,
}

impl MockEmbeddingService {
    pub fn new(embedding_dimension: usize) -> Self {
        Self { embedding_dimension }
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn generate_deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.embedding_dimension];
        if embedding.is_empty() {
            return embedding;
        }

        // Spread character trigrams over the vector so similar strings land close together
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();
        for window in chars.windows(3.min(chars.len().max(1))) {
            let hash = window
                .iter()
                .fold(17u64, |acc, c| acc.wrapping_mul(31).wrapping_add(*c as u64));
            embedding[(hash % self.embedding_dimension as u64) as usize] += 1.0;
        }

        let magnitude: f32 = embedding.iter().map(|&v| v * v).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut embedding {
                *value /= magnitude;
            }
        }
        embedding
    }
}

impl Default for MockEmbeddingService {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EmbeddingService for MockEmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| self.generate_deterministic_embedding(text))
            .collect())
    }
}

/// Configuration for embedding services
#[derive(Debug, Clone)]
pub enum EmbeddingServiceConfig {
    /// Use the Mistral embeddings endpoint
    Mistral { config: MistralConfig, model: String },
    /// Use mock embeddings for testing
    Mock { dimensions: usize },
}

/// Create an embedding service from the provided configuration
pub fn create_embedding_service(
    config: EmbeddingServiceConfig,
) -> Result<Arc<dyn EmbeddingService>, ConfigError> {
    match config {
        EmbeddingServiceConfig::Mistral { config, model } => {
            Ok(Arc::new(MistralEmbeddingService::new(&config, model)?))
        }
        EmbeddingServiceConfig::Mock { dimensions } => {
            Ok(Arc::new(MockEmbeddingService::new(dimensions)))
        }
    }
}

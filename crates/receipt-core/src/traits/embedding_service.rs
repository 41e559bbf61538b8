//! EmbeddingService trait definition for vector embeddings

use async_trait::async_trait;

use crate::data::EmbeddingError;

/// Represents an embedding endpoint that turns a batch of texts into vectors.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embeds one request's worth of texts.
    ///
    /// Contract: returns exactly one vector per input, in input order. Callers that
    /// need size limits respected go through [`crate::embedding::embed_in_chunks`].
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embeds a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch {
                chunk: 0,
                expected: 1,
                actual: 0,
            })
    }
}

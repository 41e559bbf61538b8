//! CompletionClient trait definition for text completions

use async_trait::async_trait;

use crate::data::CompletionError;

/// Represents a language-model text completion endpoint.
///
/// Implementations hold a long-lived connection and fixed sampling parameters
/// (temperature, seed) so that the same prompt yields the same or near-same text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends one prompt and returns the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

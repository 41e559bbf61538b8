//! Adapters for remote model endpoints

pub mod mistral;

pub use mistral::{MistralConfig, MistralCompletionClient, MistralEmbeddingService};

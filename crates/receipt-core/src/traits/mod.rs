//! Core traits (interfaces) for the receipt pipeline

mod completion_client;
mod embedding_service;
mod product_store;
mod receipt_store;

pub use completion_client::CompletionClient;
pub use embedding_service::EmbeddingService;
pub use product_store::ProductStore;
pub use receipt_store::{ReceiptStore, DistanceMetric};

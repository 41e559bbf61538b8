//! Core data structures for the receipt pipeline

pub mod types;
pub mod run_trace;
pub mod errors;

// Re-export all common types
pub use types::{
    ScanRow, ResolvedItem, CompletionAnswer, EmbeddedItem, ReceiptRecord, StoredRecord,
    ScoredRecord, ProductEntry, ProductRecord, StoredProduct, ScoredProduct, ItemFailure,
    FailedRow, RowOutcome,
};
pub use run_trace::RunTrace;
pub use errors::{
    CatalogError, CompletionError, ParseError, ResolutionError, EmbeddingError, AlignmentError,
    StorageError, SearchError, ConfigError, PipelineError,
};

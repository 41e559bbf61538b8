//! Receipt item resolution pipeline
//!
//! Abbreviated supermarket receipt items are resolved to full product names and
//! categories by a chat completion model, embedded, and joined back onto the scan
//! rows they came from.

// Core modules
pub mod data;
pub mod traits;
pub mod catalog;
pub mod prompt;
pub mod parser;
pub mod resilience;
pub mod resolver;
pub mod embedding;
pub mod pipeline;
pub mod storage;
pub mod search;
pub mod products;
pub mod config;

// Remote model clients
pub mod adapters;

// Testing utilities
pub mod test_utils;

// Re-export key types for convenient usage
pub use data::types::{
    ScanRow, ResolvedItem, CompletionAnswer, EmbeddedItem, ReceiptRecord, StoredRecord,
    ScoredRecord, ProductEntry, ProductRecord, StoredProduct, ScoredProduct, ItemFailure,
    FailedRow, RowOutcome,
};
pub use data::run_trace::RunTrace;
pub use data::errors::{
    CatalogError, CompletionError, ParseError, ResolutionError, EmbeddingError, AlignmentError,
    StorageError, SearchError, ConfigError, PipelineError,
};

// Re-export core traits
pub use traits::{CompletionClient, EmbeddingService, ReceiptStore, ProductStore, DistanceMetric};

pub use catalog::{load_catalog, Catalog, CatalogSource, MainCategory};
pub use prompt::build_prompt;
pub use parser::parse;
pub use resolver::{BatchResolver, CategoryPolicy, ResolverOptions};
pub use embedding::{
    embed_in_chunks, create_embedding_service, ChunkedEmbedder, EmbeddingServiceConfig,
    MockEmbeddingService,
};
pub use pipeline::{augmented_text, Pipeline, PipelineOutput};
pub use storage::{MemoryProductStore, MemoryReceiptStore};
pub use search::{SearchTarget, SemanticSearch};
pub use products::{product_text, ProductImporter};
pub use config::{CompletionSettings, PipelineConfig};
pub use resilience::RetryPolicy;
pub use adapters::{MistralConfig, MistralCompletionClient, MistralEmbeddingService};

/// Picks the log filter: `RUST_LOG` directives first, then a `LOG_LEVEL` value, then `info`.
fn log_filter(rust_log: Option<&str>, log_level: Option<&str>) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    rust_log
        .into_iter()
        .chain(log_level)
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Initialize tracing for the application
///
/// Set `LOG_FORMAT=json` for JSON lines.
pub fn init_tracing() {
    use tracing_subscriber::fmt;

    let filter = log_filter(
        std::env::var("RUST_LOG").ok().as_deref(),
        std::env::var("LOG_LEVEL").ok().as_deref(),
    );
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed, e.g. by a test harness
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_precedence() {
        assert_eq!(log_filter(None, None).to_string(), "info");
        assert_eq!(log_filter(None, Some("debug")).to_string(), "debug");
        assert_eq!(
            log_filter(Some("receipt_core=trace"), Some("debug")).to_string(),
            "receipt_core=trace"
        );
        // An unparsable value falls through to the next source
        assert_eq!(log_filter(Some("receipt_core=loud"), Some("warn")).to_string(), "warn");
    }
}

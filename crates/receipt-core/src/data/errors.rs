//! Error types for the receipt pipeline

use thiserror::Error;

use crate::search::SearchTarget;

/// Errors raised while loading or validating the category taxonomy.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read category resource {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Category resource is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Category resource must be a JSON object of main category -> subcategory list")]
    NotAnObject,

    #[error("Subcategories of '{0}' must be a list of strings")]
    InvalidSubcategories(String),

    #[error("Subcategory '{sub}' listed under both '{first}' and '{second}'")]
    DuplicateSubcategory {
        sub: String,
        first: String,
        second: String,
    },
}

/// Remote completion call failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    #[error("Completion endpoint rejected credentials ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("Completion endpoint rate limited the request: {0}")]
    RateLimited(String),

    #[error("Completion endpoint server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Completion endpoint returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error calling completion endpoint: {0}")]
    Network(String),

    #[error("Completion request timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Whether a repeated attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::RateLimited(_)
                | CompletionError::Server { .. }
                | CompletionError::Network(_)
                | CompletionError::Timeout(_)
        )
    }
}

/// Completion text that does not satisfy the answer contract.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Completion is not a JSON object: {message}; raw text: {raw}")]
    InvalidJson { message: String, raw: String },

    #[error("Completion is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Why a single receipt item could not be resolved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("Parsing failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Category pair '{main}' / '{sub}' is not in the catalog")]
    UnknownCategory { main: String, sub: String },
}

/// Embedding request failures. Any of these fails the whole embedding batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("Embedding request for chunk {chunk} failed: {message}")]
    Request { chunk: usize, message: String },

    #[error("Embedding endpoint returned {actual} vectors for chunk {chunk} of {expected} inputs")]
    CountMismatch {
        chunk: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Embedding endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Embedding generation error: {0}")]
    Backend(String),
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::Request { .. } | EmbeddingError::Backend(_))
    }

    /// Tags a backend error with the chunk it happened in.
    pub fn in_chunk(self, chunk: usize) -> Self {
        match self {
            EmbeddingError::Backend(message) => EmbeddingError::Request { chunk, message },
            EmbeddingError::Request { message, .. } => EmbeddingError::Request { chunk, message },
            EmbeddingError::CountMismatch { expected, actual, .. } => {
                EmbeddingError::CountMismatch { chunk, expected, actual }
            }
            other => other,
        }
    }
}

/// Positional join invariants broken between resolver output, embeddings and scan rows.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    #[error("Resolver returned {actual} results for {expected} scan rows")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Received {actual} embeddings for {expected} resolved items")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    #[error("Row {index}: scan has '{expected}' but resolved item carries '{actual}'")]
    AbbrMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
}

/// Storage collaborator failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Vector has dimension {actual}, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Embedding service returned no vector for the query")]
    EmptyQueryEmbedding,

    #[error("No {0} store is configured for search")]
    TargetUnavailable(SearchTarget),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Batch-fatal pipeline errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Alignment error: {0}")]
    Alignment(#[from] AlignmentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_error_display() {
        let error = CompletionError::Timeout(30);
        assert_eq!(format!("{}", error), "Completion request timed out after 30s");
    }

    #[test]
    fn test_retryable_completion_errors() {
        assert!(CompletionError::RateLimited("slow down".into()).is_retryable());
        assert!(CompletionError::Server { status: 503, body: String::new() }.is_retryable());
        assert!(CompletionError::Network("reset".into()).is_retryable());
        assert!(!CompletionError::Auth { status: 401, body: String::new() }.is_retryable());
        assert!(!CompletionError::InvalidResponse("no choices".into()).is_retryable());
    }

    #[test]
    fn test_resolution_error_wraps_parse_error() {
        let error: ResolutionError = ParseError::MissingField("productName").into();
        assert_eq!(
            error.to_string(),
            "Parsing failed: Completion is missing required field 'productName'"
        );
    }

    #[test]
    fn test_embedding_error_in_chunk() {
        let error = EmbeddingError::Backend("503".into()).in_chunk(2);
        assert_eq!(error, EmbeddingError::Request { chunk: 2, message: "503".into() });
        assert_eq!(EmbeddingError::InvalidChunkSize.in_chunk(4), EmbeddingError::InvalidChunkSize);
    }

    #[test]
    fn test_rejected_embedding_requests_are_final() {
        let rejected = EmbeddingError::Rejected { status: 401, body: "bad key".into() };
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.clone().in_chunk(3), rejected);
        assert!(EmbeddingError::Backend("503 Service Unavailable".into()).is_retryable());
    }
}

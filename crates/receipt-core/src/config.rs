//! Configuration for the receipt pipeline
//!
//! Settings start from defaults and are overridden from environment variables.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adapters::mistral::{MistralConfig, DEFAULT_BASE_URL};
use crate::catalog::{Catalog, CatalogSource};
use crate::data::{CatalogError, ConfigError};
use crate::resilience::RetryPolicy;
use crate::resolver::{CategoryPolicy, ResolverOptions};

/// Sampling parameters for completion requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSettings {
    /// Model identifier: mistral-tiny, mistral-small or mistral-medium
    #[serde(default = "default_completion_model")]
    pub model: String,

    /// Lower is more deterministic
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
}

fn default_completion_model() -> String {
    "mistral-medium".to_string()
}

fn default_temperature() -> f32 {
    0.5
}

fn default_random_seed() -> u64 {
    42
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            temperature: default_temperature(),
            random_seed: default_random_seed(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// API key for the model endpoints
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub completion: CompletionSettings,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Maximum number of texts per embedding request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Completions in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Deadline for a single remote call, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Taxonomy file; the built-in taxonomy is used when unset
    #[serde(default)]
    pub categories_path: Option<PathBuf>,

    #[serde(default)]
    pub category_policy: CategoryPolicy,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_embedding_model() -> String {
    "mistral-embed".to_string()
}

fn default_chunk_size() -> usize {
    50
}

fn default_embedding_dimension() -> usize {
    1024
}

fn default_max_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            completion: CompletionSettings::default(),
            embedding_model: default_embedding_model(),
            chunk_size: default_chunk_size(),
            embedding_dimension: default_embedding_dimension(),
            max_concurrency: default_max_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            categories_path: None,
            category_policy: CategoryPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, raw: &str, target: &mut T) {
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => warn!("Invalid {} value: {}", key, raw),
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(api_key) = lookup("MISTRAL_API_KEY") {
            config.api_key = Some(api_key);
        }
        if let Some(base_url) = lookup("MISTRAL_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(model) = lookup("COMPLETION_MODEL") {
            config.completion.model = model;
        }
        if let Some(raw) = lookup("COMPLETION_TEMPERATURE") {
            parse_or_warn("COMPLETION_TEMPERATURE", &raw, &mut config.completion.temperature);
        }
        if let Some(raw) = lookup("COMPLETION_RANDOM_SEED") {
            parse_or_warn("COMPLETION_RANDOM_SEED", &raw, &mut config.completion.random_seed);
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(raw) = lookup("EMBEDDING_CHUNK_SIZE") {
            parse_or_warn("EMBEDDING_CHUNK_SIZE", &raw, &mut config.chunk_size);
        }
        if let Some(raw) = lookup("EMBEDDING_DIMENSION") {
            parse_or_warn("EMBEDDING_DIMENSION", &raw, &mut config.embedding_dimension);
        }
        if let Some(raw) = lookup("RESOLVER_MAX_CONCURRENCY") {
            parse_or_warn("RESOLVER_MAX_CONCURRENCY", &raw, &mut config.max_concurrency);
        }
        if let Some(raw) = lookup("REQUEST_TIMEOUT_SECS") {
            parse_or_warn("REQUEST_TIMEOUT_SECS", &raw, &mut config.request_timeout_secs);
        }
        if let Some(path) = lookup("CATEGORIES_PATH") {
            if !path.trim().is_empty() {
                config.categories_path = Some(PathBuf::from(path));
            }
        }
        if let Some(raw) = lookup("CATEGORY_POLICY") {
            parse_or_warn("CATEGORY_POLICY", &raw, &mut config.category_policy);
        }
        if let Some(raw) = lookup("RETRY_MAX_RETRIES") {
            parse_or_warn("RETRY_MAX_RETRIES", &raw, &mut config.retry.max_retries);
        }
        if let Some(raw) = lookup("RETRY_INITIAL_BACKOFF_MS") {
            parse_or_warn("RETRY_INITIAL_BACKOFF_MS", &raw, &mut config.retry.initial_backoff_ms);
        }
        if let Some(raw) = lookup("RETRY_BACKOFF_FACTOR") {
            parse_or_warn("RETRY_BACKOFF_FACTOR", &raw, &mut config.retry.backoff_factor);
        }
        if let Some(raw) = lookup("RETRY_MAX_BACKOFF_MS") {
            parse_or_warn("RETRY_MAX_BACKOFF_MS", &raw, &mut config.retry.max_backoff_ms);
        }

        if config.chunk_size == 0 {
            warn!("EMBEDDING_CHUNK_SIZE must be positive, using {}", default_chunk_size());
            config.chunk_size = default_chunk_size();
        }
        if config.max_concurrency == 0 {
            warn!("RESOLVER_MAX_CONCURRENCY must be positive, using 1");
            config.max_concurrency = 1;
        }
        if config.api_key.is_none() {
            warn!("No MISTRAL_API_KEY provided - remote model clients cannot be built");
        }

        info!("Loaded pipeline configuration");
        config
    }

    /// Connection settings for the Mistral clients; requires an API key.
    pub fn mistral_config(&self) -> Result<MistralConfig, ConfigError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or(ConfigError::Missing("MISTRAL_API_KEY"))?;
        Ok(MistralConfig {
            base_url: self.base_url.clone(),
            api_key,
            timeout_secs: self.request_timeout_secs,
        })
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            max_concurrency: self.max_concurrency,
            request_timeout_secs: self.request_timeout_secs,
            category_policy: self.category_policy,
            retry: self.retry.clone(),
        }
    }

    /// The configured taxonomy file, or the built-in taxonomy.
    pub fn catalog_source(&self) -> CatalogSource {
        match &self.categories_path {
            Some(path) => CatalogSource::File(path.clone()),
            None => CatalogSource::Builtin,
        }
    }

    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        self.catalog_source().load()
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::CompletionSettings;
use crate::data::{CompletionError, ConfigError, EmbeddingError};
use crate::traits::{CompletionClient, EmbeddingService};

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

/// Connection settings shared by the Mistral completion and embedding clients
#[derive(Debug, Clone)]
pub struct MistralConfig {
    /// Base URL of the API, without the `/v1` suffix
    pub base_url: String,
    pub api_key: String,
    /// Timeout in seconds for HTTP requests
    pub timeout_secs: u64,
}

impl MistralConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout_secs: 60,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builds the long-lived HTTP client with auth headers installed.
    fn http_client(&self) -> Result<Client, ConfigError> {
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigError::Missing("MISTRAL_API_KEY"));
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_| {
            ConfigError::Invalid {
                key: "MISTRAL_API_KEY",
                value: "<redacted>".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Chat completion client for the Mistral API
#[derive(Debug, Clone)]
pub struct MistralCompletionClient {
    client: Client,
    endpoint: String,
    settings: CompletionSettings,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    random_seed: u64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

impl MistralCompletionClient {
    pub fn new(config: &MistralConfig, settings: CompletionSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            client: config.http_client()?,
            endpoint: config.endpoint("chat/completions"),
            settings,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Maps a transport error to a CompletionError
    fn map_http_error(&self, error: reqwest::Error) -> CompletionError {
        if error.is_timeout() {
            CompletionError::Timeout(self.timeout_secs)
        } else if error.is_decode() {
            CompletionError::InvalidResponse(error.to_string())
        } else {
            CompletionError::Network(error.to_string())
        }
    }
}

/// Rate limits and server errors stay retryable; any other status is final.
fn map_embedding_status(status: StatusCode, body: String) -> EmbeddingError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        EmbeddingError::Backend(format!("{}: {}", status, body))
    } else {
        EmbeddingError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

fn map_status(status: StatusCode, body: String) -> CompletionError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionError::Auth {
            status: status.as_u16(),
            body,
        },
        StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited(body),
        s if s.is_server_error() => CompletionError::Server {
            status: s.as_u16(),
            body,
        },
        s => CompletionError::Http {
            status: s.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl CompletionClient for MistralCompletionClient {
    #[instrument(skip(self, prompt), fields(model = %self.settings.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.settings.temperature,
            random_seed: self.settings.random_seed,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(map_status(status, body));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.map_http_error(e))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::InvalidResponse("response has no choices".to_string()))?;
        debug!(response_len = content.len(), "Received completion");
        Ok(content)
    }
}

/// Embedding client for the Mistral API
#[derive(Debug, Clone)]
pub struct MistralEmbeddingService {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl MistralEmbeddingService {
    pub fn new(config: &MistralConfig, model: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            client: config.http_client()?,
            endpoint: config.endpoint("embeddings"),
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingService for MistralEmbeddingService {
    #[instrument(skip(self, texts), fields(model = %self.model, inputs = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(map_embedding_status(status, body));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Backend(format!("failed to parse response: {}", e)))?;
        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                chunk: 0,
                expected: texts.len(),
                actual: parsed.data.len(),
            });
        }
        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::data::{CompletionAnswer, CompletionError, EmbeddingError};
use crate::traits::{CompletionClient, EmbeddingService};

const ITEM_LABEL: &str = "Verkürzter Produktname: ";

/// Serialized completion answer, as the model would return it.
pub fn answer_json(product_name: &str, category_main: &str, category_sub: &str) -> String {
    let answer = CompletionAnswer::new(product_name, category_main, category_sub);
    serde_json::to_string(&answer).unwrap_or_default()
}

/// Pulls the item out of the delimited data block at the end of a resolution prompt.
pub fn item_from_prompt(prompt: &str) -> Option<&str> {
    let start = prompt.rfind(ITEM_LABEL)? + ITEM_LABEL.len();
    let rest = &prompt[start..];
    Some(rest.split('\n').next().unwrap_or(rest))
}

/// Completion client answering from a per-item script.
///
/// Items are recognised by the abbreviation in the prompt. Unscripted items answer
/// with `InvalidResponse`.
#[derive(Default)]
pub struct ScriptedCompletionClient {
    responses: HashMap<String, Result<String, CompletionError>>,
    delays: HashMap<String, Duration>,
    transient_failures: HashMap<String, (usize, CompletionError)>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, item: &str, raw: impl Into<String>) -> Self {
        self.responses.insert(item.to_string(), Ok(raw.into()));
        self
    }

    pub fn fail(mut self, item: &str, error: CompletionError) -> Self {
        self.responses.insert(item.to_string(), Err(error));
        self
    }

    /// The first `times` calls for `item` fail with `error`, later calls use the script.
    pub fn fail_first(mut self, item: &str, times: usize, error: CompletionError) -> Self {
        self.transient_failures.insert(item.to_string(), (times, error));
        self
    }

    pub fn delay(mut self, item: &str, delay: Duration) -> Self {
        self.delays.insert(item.to_string(), delay);
        self
    }

    pub fn calls_for(&self, item: &str) -> usize {
        self.calls.lock().get(item).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

impl fmt::Debug for ScriptedCompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedCompletionClient")
            .field("items", &self.responses.len())
            .finish()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let item = item_from_prompt(prompt).unwrap_or_default().to_string();
        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(item.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(delay) = self.delays.get(&item) {
            tokio::time::sleep(*delay).await;
        }

        if let Some((times, error)) = self.transient_failures.get(&item) {
            if call <= *times {
                return Err(error.clone());
            }
        }

        self.responses.get(&item).cloned().unwrap_or_else(|| {
            Err(CompletionError::InvalidResponse(format!(
                "no scripted response for '{item}'"
            )))
        })
    }
}

enum EmbeddingScript {
    /// Each text gets `[global position]`
    Indexed,
    /// One canned response per call
    Responses(Vec<Vec<Vec<f32>>>),
}

/// Embedding service that records every request it receives.
pub struct RecordingEmbeddingService {
    script: EmbeddingScript,
    failing_request: Option<usize>,
    requests: Mutex<Vec<Vec<String>>>,
    embedded: Mutex<usize>,
}

impl RecordingEmbeddingService {
    /// Answers each text with a one-element vector holding its position across all calls.
    /// Failed calls do not advance the position.
    pub fn indexed() -> Self {
        Self::with_script(EmbeddingScript::Indexed)
    }

    pub fn scripted(responses: Vec<Vec<Vec<f32>>>) -> Self {
        Self::with_script(EmbeddingScript::Responses(responses))
    }

    fn with_script(script: EmbeddingScript) -> Self {
        Self {
            script,
            failing_request: None,
            requests: Mutex::new(Vec::new()),
            embedded: Mutex::new(0),
        }
    }

    /// Makes the `request`-th call (zero based) fail with a backend error.
    pub fn fail_on_request(mut self, request: usize) -> Self {
        self.failing_request = Some(request);
        self
    }

    /// Every call received so far, failed ones included.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl EmbeddingService for RecordingEmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = {
            let mut requests = self.requests.lock();
            requests.push(texts.to_vec());
            requests.len() - 1
        };

        if self.failing_request == Some(request) {
            return Err(EmbeddingError::Backend(format!("request {request} rejected")));
        }

        match &self.script {
            EmbeddingScript::Indexed => {
                let mut embedded = self.embedded.lock();
                let start = *embedded;
                *embedded += texts.len();
                Ok((start..start + texts.len()).map(|i| vec![i as f32]).collect())
            }
            EmbeddingScript::Responses(responses) => responses
                .get(request)
                .cloned()
                .ok_or_else(|| EmbeddingError::Backend(format!("no scripted response for request {request}"))),
        }
    }
}

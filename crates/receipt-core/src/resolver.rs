//! Batch resolver: turns abbreviated receipt items into resolved, categorised items.
//!
//! Items are independent, so up to `max_concurrency` completions run at once. Each
//! result is written into the slot of its input index, which keeps the output aligned
//! with the input no matter in which order completions finish. A failing item is
//! recorded as an [`ItemFailure`] at its position and never aborts the batch.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::data::{CompletionError, ItemFailure, ResolutionError, ResolvedItem, RunTrace};
use crate::parser::parse;
use crate::prompt::build_prompt;
use crate::resilience::{retry, RetryPolicy};
use crate::traits::CompletionClient;

/// What to do when the model answers with a category pair outside the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryPolicy {
    /// Record the item as failed
    #[default]
    Reject,
    /// Keep the product name, file it under the catch-all "not recognised" category
    Fallback,
}

impl FromStr for CategoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(CategoryPolicy::Reject),
            "fallback" => Ok(CategoryPolicy::Fallback),
            other => Err(format!("unknown category policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverOptions {
    pub max_concurrency: usize,
    /// Deadline per completion attempt, in seconds
    pub request_timeout_secs: u64,
    pub category_policy: CategoryPolicy,
    pub retry: RetryPolicy,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            request_timeout_secs: 60,
            category_policy: CategoryPolicy::Reject,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct BatchResolver {
    client: Arc<dyn CompletionClient>,
    options: ResolverOptions,
}

impl BatchResolver {
    pub fn new(client: Arc<dyn CompletionClient>, options: ResolverOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolves a single item against the catalog.
    pub async fn resolve_one(
        &self,
        item: &str,
        catalog: &Catalog,
    ) -> Result<ResolvedItem, ResolutionError> {
        let catalog_text = catalog.render();
        self.resolve_item(item, catalog, &catalog_text, &RunTrace::start())
            .await
    }

    /// Resolves every item; the result has the same length and order as `items`.
    pub async fn resolve_all(
        &self,
        items: &[String],
        catalog: &Catalog,
    ) -> Vec<Result<ResolvedItem, ItemFailure>> {
        self.resolve_all_traced(items, catalog, &RunTrace::start())
            .await
    }

    pub async fn resolve_all_traced(
        &self,
        items: &[String],
        catalog: &Catalog,
        run: &RunTrace,
    ) -> Vec<Result<ResolvedItem, ItemFailure>> {
        let catalog_text = catalog.render();
        let concurrency = self.options.max_concurrency.max(1);
        info!(
            run_id = %run.run_id,
            items = items.len(),
            concurrency,
            "Resolving receipt items"
        );

        let mut slots: Vec<Option<Result<ResolvedItem, ItemFailure>>> =
            (0..items.len()).map(|_| None).collect();

        let catalog_text = &catalog_text;
        let mut completions = stream::iter(items.iter().enumerate())
            .map(|(index, item)| {
                let item_span = run.item_span();
                async move {
                    let outcome = self.resolve_item(item, catalog, catalog_text, &item_span).await;
                    (index, outcome)
                }
            })
            .buffer_unordered(concurrency);

        while let Some((index, outcome)) = completions.next().await {
            let item = &items[index];
            slots[index] = Some(match outcome {
                Ok(resolved) => {
                    info!(
                        run_id = %run.run_id,
                        index,
                        item = %item,
                        product_name = %resolved.product_name,
                        "Resolved item"
                    );
                    Ok(resolved)
                }
                Err(error) => {
                    warn!(
                        run_id = %run.run_id,
                        index,
                        item = %item,
                        error = %error,
                        "Failed to resolve item"
                    );
                    Err(ItemFailure {
                        index,
                        product_abbr: item.clone(),
                        error,
                    })
                }
            });
        }

        slots.into_iter().flatten().collect()
    }

    async fn resolve_item(
        &self,
        item: &str,
        catalog: &Catalog,
        catalog_text: &str,
        run: &RunTrace,
    ) -> Result<ResolvedItem, ResolutionError> {
        let prompt = build_prompt(item, catalog_text);
        debug!(run_id = %run.run_id, span_id = %run.span_id, item = %item, "Requesting completion");

        let raw = retry(
            &self.options.retry,
            "completion",
            CompletionError::is_retryable,
            || self.complete_with_deadline(&prompt),
        )
        .await?;

        let resolved = parse(&raw, item)?;
        match catalog.validate(&resolved) {
            Ok(()) => Ok(resolved),
            Err(err) => match self.options.category_policy {
                CategoryPolicy::Reject => Err(err),
                CategoryPolicy::Fallback => {
                    let (main, sub) = catalog.fallback();
                    warn!(
                        run_id = %run.run_id,
                        item = %item,
                        category_main = %resolved.category_main,
                        category_sub = %resolved.category_sub,
                        "Unknown category pair, using fallback"
                    );
                    Ok(ResolvedItem {
                        category_main: main.to_string(),
                        category_sub: sub.to_string(),
                        ..resolved
                    })
                }
            },
        }
    }

    async fn complete_with_deadline(&self, prompt: &str) -> Result<String, CompletionError> {
        let deadline = Duration::from_secs(self.options.request_timeout_secs);
        match tokio::time::timeout(deadline, self.client.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(self.options.request_timeout_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load_catalog;
    use crate::data::ParseError;
    use crate::test_utils::{answer_json, ScriptedCompletionClient};
    use async_trait::async_trait;
    use mockall::mock;
    use pretty_assertions::assert_eq;

    mock! {
        pub Completion {}

        #[async_trait]
        impl CompletionClient for Completion {
            async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
        }
    }

    fn options() -> ResolverOptions {
        ResolverOptions {
            max_concurrency: 4,
            request_timeout_secs: 5,
            category_policy: CategoryPolicy::Reject,
            retry: RetryPolicy {
                max_retries: 2,
                initial_backoff_ms: 1,
                backoff_factor: 1.0,
                max_backoff_ms: 1,
            },
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_known_good_item_round_trip() {
        let mut client = MockCompletion::new();
        client
            .expect_complete()
            .withf(|prompt: &str| prompt.contains("Verkürzter Produktname: GRANATAPEL\n>>>"))
            .times(1)
            .returning(|_| {
                Ok("\n{\"productName\": \"Granatapfel\", \"categoryMain\": \"Obst & Gemüse\", \"categorySub\": \"Frisches Obst\"}\n".to_string())
            });

        let resolver = BatchResolver::new(Arc::new(client), options());
        let catalog = load_catalog().unwrap();
        let item = resolver.resolve_one("GRANATAPEL", &catalog).await.unwrap();

        assert_eq!(item.product_abbr, "GRANATAPEL");
        assert_eq!(item.product_name, "Granatapfel");
        assert_eq!(item.category_main, "Obst & Gemüse");
        assert_eq!(item.category_sub, "Frisches Obst");
    }

    #[tokio::test]
    async fn test_failures_are_tagged_in_place() {
        let client = ScriptedCompletionClient::new()
            .respond("GRANATAPEL", answer_json("Granatapfel", "Obst & Gemüse", "Frisches Obst"))
            .respond("KAPUTT", "Das ist kein JSON")
            .fail("OFFLINE", CompletionError::Auth { status: 401, body: "bad key".into() })
            .respond("KASTEN LEER", answer_json("Leergut Kasten", "Sonstige Positionen", "Pfand & Leergut"));

        let resolver = BatchResolver::new(Arc::new(client), options());
        let catalog = load_catalog().unwrap();
        let items = strings(&["GRANATAPEL", "KAPUTT", "OFFLINE", "KASTEN LEER"]);
        let results = resolver.resolve_all(&items, &catalog).await;

        assert_eq!(results.len(), items.len());
        assert_eq!(results[0].as_ref().unwrap().product_name, "Granatapfel");

        let parse_failure = results[1].as_ref().unwrap_err();
        assert_eq!(parse_failure.index, 1);
        assert_eq!(parse_failure.product_abbr, "KAPUTT");
        assert!(matches!(
            parse_failure.error,
            ResolutionError::Parse(ParseError::InvalidJson { .. })
        ));

        let completion_failure = results[2].as_ref().unwrap_err();
        assert_eq!(completion_failure.index, 2);
        assert!(matches!(
            completion_failure.error,
            ResolutionError::Completion(CompletionError::Auth { .. })
        ));

        assert_eq!(results[3].as_ref().unwrap().product_abbr, "KASTEN LEER");
    }

    #[tokio::test]
    async fn test_order_preserved_under_out_of_order_completion() {
        // Earlier items answer slower than later ones.
        let mut client = ScriptedCompletionClient::new();
        let items: Vec<String> = (0..8).map(|i| format!("ITEM{i}")).collect();
        for (i, item) in items.iter().enumerate() {
            client = client
                .respond(item, answer_json(&format!("Produkt {i}"), "Getränke", "Wasser"))
                .delay(item, Duration::from_millis(((8 - i) * 10) as u64));
        }

        let resolver = BatchResolver::new(Arc::new(client), options());
        let catalog = load_catalog().unwrap();
        let results = resolver.resolve_all(&items, &catalog).await;

        let names: Vec<_> = results
            .iter()
            .map(|r| r.as_ref().unwrap().product_name.clone())
            .collect();
        let expected: Vec<_> = (0..8).map(|i| format!("Produkt {i}")).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_unknown_category_rejected_or_fallback() {
        let client = Arc::new(
            ScriptedCompletionClient::new()
                .respond("MONDSTEIN", answer_json("Mondstein", "Edelsteine", "Halbedelsteine")),
        );
        let catalog = load_catalog().unwrap();

        let resolver = BatchResolver::new(client.clone(), options());
        let err = resolver.resolve_one("MONDSTEIN", &catalog).await.unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnknownCategory {
                main: "Edelsteine".into(),
                sub: "Halbedelsteine".into(),
            }
        );

        let fallback = BatchResolver::new(
            client,
            ResolverOptions {
                category_policy: CategoryPolicy::Fallback,
                ..options()
            },
        );
        let item = fallback.resolve_one("MONDSTEIN", &catalog).await.unwrap();
        assert_eq!(item.product_name, "Mondstein");
        assert_eq!(item.category_main, "Sonstige Positionen");
        assert_eq!(item.category_sub, "Kategorie nicht erkannt");
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let client = Arc::new(
            ScriptedCompletionClient::new()
                .respond("MILCH", answer_json("Vollmilch", "Käse, Eier & Molkerei", "Milch"))
                .fail_first("MILCH", 2, CompletionError::Server { status: 503, body: String::new() }),
        );
        let resolver = BatchResolver::new(client.clone(), options());
        let catalog = load_catalog().unwrap();

        let item = resolver.resolve_one("MILCH", &catalog).await.unwrap();
        assert_eq!(item.product_name, "Vollmilch");
        assert_eq!(client.calls_for("MILCH"), 3);
    }

    #[tokio::test]
    async fn test_hung_call_hits_deadline() {
        let client = ScriptedCompletionClient::new()
            .respond("LANGSAM", answer_json("Langsam", "Getränke", "Wasser"))
            .delay("LANGSAM", Duration::from_secs(5));
        let resolver = BatchResolver::new(
            Arc::new(client),
            ResolverOptions {
                request_timeout_secs: 1,
                retry: RetryPolicy::none(),
                ..options()
            },
        );
        let catalog = load_catalog().unwrap();

        let err = resolver.resolve_one("LANGSAM", &catalog).await.unwrap_err();
        assert_eq!(err, ResolutionError::Completion(CompletionError::Timeout(1)));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let resolver = BatchResolver::new(Arc::new(ScriptedCompletionClient::new()), options());
        let catalog = load_catalog().unwrap();
        assert!(resolver.resolve_all(&[], &catalog).await.is_empty());
    }

    #[test]
    fn test_category_policy_from_str() {
        assert_eq!("Fallback".parse::<CategoryPolicy>(), Ok(CategoryPolicy::Fallback));
        assert_eq!(" reject ".parse::<CategoryPolicy>(), Ok(CategoryPolicy::Reject));
        assert!("maybe".parse::<CategoryPolicy>().is_err());
    }
}

//! Pipeline orchestrator: scan rows in, embedded receipt records out.
//!
//! Three sequences are joined by position along the way: the scan rows, the
//! resolver results and the embeddings of the successful results. Every join is
//! checked, and a broken alignment fails the batch instead of silently pairing a
//! price with the wrong product.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adapters::mistral::MistralCompletionClient;
use crate::catalog::CatalogSource;
use crate::config::PipelineConfig;
use crate::data::{
    AlignmentError, EmbeddedItem, FailedRow, PipelineError, ReceiptRecord, ResolvedItem,
    RowOutcome, ScanRow, RunTrace,
};
use crate::embedding::{create_embedding_service, ChunkedEmbedder, EmbeddingServiceConfig};
use crate::resolver::BatchResolver;
use crate::traits::{CompletionClient, EmbeddingService, ReceiptStore};

/// Text that gets embedded for a resolved item.
pub fn augmented_text(item: &ResolvedItem) -> String {
    format!(
        "{} {} {} {}",
        item.product_name, item.category_main, item.category_sub, item.product_abbr
    )
}

/// One outcome per scan row, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub rows: Vec<RowOutcome>,
}

impl PipelineOutput {
    pub fn records(&self) -> Vec<&ReceiptRecord> {
        self.rows
            .iter()
            .filter_map(|row| match row {
                RowOutcome::Embedded(record) => Some(record),
                RowOutcome::Failed(_) => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<&FailedRow> {
        self.rows
            .iter()
            .filter_map(|row| match row {
                RowOutcome::Failed(failed) => Some(failed),
                RowOutcome::Embedded(_) => None,
            })
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.rows.iter().filter(|row| row.is_embedded()).count()
    }

    pub fn failed(&self) -> usize {
        self.rows.len() - self.succeeded()
    }
}

pub struct Pipeline {
    resolver: BatchResolver,
    embedder: ChunkedEmbedder,
    catalog: CatalogSource,
}

impl Pipeline {
    pub fn new(
        resolver: BatchResolver,
        embedder: ChunkedEmbedder,
        catalog: impl Into<CatalogSource>,
    ) -> Self {
        Self {
            resolver,
            embedder,
            catalog: catalog.into(),
        }
    }

    /// Wires the Mistral clients and the configured catalog.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let mistral = config.mistral_config()?;
        let completion: Arc<dyn CompletionClient> = Arc::new(MistralCompletionClient::new(
            &mistral,
            config.completion.clone(),
        )?);
        let embedding = create_embedding_service(EmbeddingServiceConfig::Mistral {
            config: mistral,
            model: config.embedding_model.clone(),
        })?;

        Ok(Self::with_clients(
            completion,
            embedding,
            config.catalog_source(),
            config,
        ))
    }

    /// Builds a pipeline around the given clients, taking every other setting from `config`.
    pub fn with_clients(
        completion: Arc<dyn CompletionClient>,
        embedding: Arc<dyn EmbeddingService>,
        catalog: impl Into<CatalogSource>,
        config: &PipelineConfig,
    ) -> Self {
        let resolver = BatchResolver::new(completion, config.resolver_options());
        let embedder =
            ChunkedEmbedder::new(embedding, config.chunk_size).with_retry(config.retry.clone());
        Self::new(resolver, embedder, catalog)
    }

    pub fn catalog_source(&self) -> &CatalogSource {
        &self.catalog
    }

    pub async fn run(&self, scan_rows: &[ScanRow]) -> Result<PipelineOutput, PipelineError> {
        let run = RunTrace::start();
        info!(run_id = %run.run_id, rows = scan_rows.len(), "Starting pipeline run");

        // Loaded once per run so taxonomy edits apply to the next run
        let catalog = self.catalog.load()?;

        let items: Vec<String> = scan_rows.iter().map(|row| row.product_abbr.clone()).collect();
        let results = self
            .resolver
            .resolve_all_traced(&items, &catalog, &run)
            .await;
        if results.len() != scan_rows.len() {
            return Err(AlignmentError::LengthMismatch {
                expected: scan_rows.len(),
                actual: results.len(),
            }
            .into());
        }

        let texts: Vec<String> = results
            .iter()
            .filter_map(|result| result.as_ref().ok())
            .map(augmented_text)
            .collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(AlignmentError::EmbeddingCountMismatch {
                expected: texts.len(),
                actual: embeddings.len(),
            }
            .into());
        }

        let mut embeddings = embeddings.into_iter();
        let mut rows = Vec::with_capacity(scan_rows.len());
        for (index, (row, result)) in scan_rows.iter().zip(results).enumerate() {
            match result {
                Ok(item) => {
                    if item.product_abbr != row.product_abbr {
                        return Err(AlignmentError::AbbrMismatch {
                            index,
                            expected: row.product_abbr.clone(),
                            actual: item.product_abbr,
                        }
                        .into());
                    }
                    let embedding =
                        embeddings
                            .next()
                            .ok_or(AlignmentError::EmbeddingCountMismatch {
                                expected: texts.len(),
                                actual: index,
                            })?;
                    rows.push(RowOutcome::Embedded(ReceiptRecord::join(
                        row,
                        EmbeddedItem { item, embedding },
                    )));
                }
                Err(failure) => {
                    rows.push(RowOutcome::Failed(FailedRow::from_failure(row, &failure)));
                }
            }
        }

        let output = PipelineOutput { rows };
        info!(
            run_id = %run.run_id,
            succeeded = output.succeeded(),
            failed = output.failed(),
            "Pipeline run finished"
        );
        if output.failed() > 0 {
            warn!(run_id = %run.run_id, failed = output.failed(), "Some rows could not be resolved");
        }
        Ok(output)
    }

    /// Runs the pipeline and persists every successful record.
    pub async fn run_and_store(
        &self,
        scan_rows: &[ScanRow],
        store: &dyn ReceiptStore,
    ) -> Result<PipelineOutput, PipelineError> {
        let output = self.run(scan_rows).await?;
        let records: Vec<ReceiptRecord> = output.records().into_iter().cloned().collect();
        if !records.is_empty() {
            let inserted = store.insert_records(&records).await?;
            info!(inserted, "Stored receipt records");
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load_catalog;
    use crate::data::{CompletionError, EmbeddingError};
    use crate::embedding::MockEmbeddingService;
    use crate::resilience::RetryPolicy;
    use crate::storage::MemoryReceiptStore;
    use crate::test_utils::{answer_json, RecordingEmbeddingService, ScriptedCompletionClient};
    use pretty_assertions::assert_eq;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            chunk_size: 2,
            embedding_dimension: 16,
            retry: RetryPolicy::none(),
            ..PipelineConfig::default()
        }
    }

    fn completion() -> ScriptedCompletionClient {
        ScriptedCompletionClient::new()
            .respond("GRANATAPEL", answer_json("Granatapfel", "Obst & Gemüse", "Frisches Obst"))
            .respond("KASTEN LEER", answer_json("Leergut Kasten", "Sonstige Positionen", "Pfand & Leergut"))
            .respond("BIO VOLLM", answer_json("Bio Vollmilch", "Käse, Eier & Molkerei", "Milch"))
            .respond("KAPUTT", "Ich weiß es leider nicht.")
    }

    fn rows() -> Vec<ScanRow> {
        vec![
            ScanRow::new("r-1", 1.49, "GRANATAPEL"),
            ScanRow::new("r-1", 1.5, "KAPUTT"),
            ScanRow::new("r-1", -3.1, "KASTEN LEER"),
            ScanRow::new("r-2", 1.19, "BIO VOLLM"),
        ]
    }

    #[test]
    fn test_augmented_text() {
        let item = ResolvedItem {
            product_abbr: "GRANATAPEL".into(),
            product_name: "Granatapfel".into(),
            category_main: "Obst & Gemüse".into(),
            category_sub: "Frisches Obst".into(),
        };
        assert_eq!(augmented_text(&item), "Granatapfel Obst & Gemüse Frisches Obst GRANATAPEL");
    }

    #[tokio::test]
    async fn test_run_joins_rows_by_position() {
        let embedding = Arc::new(RecordingEmbeddingService::indexed());
        let pipeline = Pipeline::with_clients(
            Arc::new(completion()),
            embedding.clone(),
            load_catalog().unwrap(),
            &test_config(),
        );

        let output = pipeline.run(&rows()).await.unwrap();
        assert_eq!(output.rows.len(), 4);
        assert_eq!(output.succeeded(), 3);
        assert_eq!(output.failed(), 1);

        for (row, outcome) in rows().iter().zip(&output.rows) {
            assert_eq!(outcome.product_abbr(), row.product_abbr);
        }

        let records = output.records();
        assert_eq!(records[0].product_name, "Granatapfel");
        assert_eq!(records[0].price, 1.49);
        assert_eq!(records[0].embedding, vec![0.0]);
        assert_eq!(records[1].product_abbr, "KASTEN LEER");
        assert_eq!(records[1].price, -3.1);
        assert_eq!(records[1].embedding, vec![1.0]);
        assert_eq!(records[2].receipt_id, "r-2");
        assert_eq!(records[2].embedding, vec![2.0]);

        let failures = output.failures();
        assert_eq!(failures[0].product_abbr, "KAPUTT");
        assert!(failures[0].reason.contains("Parsing failed"), "{}", failures[0].reason);

        // Only successful rows are embedded, two per request
        assert_eq!(
            embedding.requests(),
            vec![
                vec![
                    "Granatapfel Obst & Gemüse Frisches Obst GRANATAPEL".to_string(),
                    "Leergut Kasten Sonstige Positionen Pfand & Leergut KASTEN LEER".to_string(),
                ],
                vec!["Bio Vollmilch Käse, Eier & Molkerei Milch BIO VOLLM".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_all_failed_rows_skip_embedding() {
        let embedding = Arc::new(RecordingEmbeddingService::indexed());
        let client = ScriptedCompletionClient::new()
            .fail("A", CompletionError::Auth { status: 401, body: String::new() });
        let pipeline = Pipeline::with_clients(
            Arc::new(client),
            embedding.clone(),
            load_catalog().unwrap(),
            &test_config(),
        );

        let output = pipeline.run(&[ScanRow::new("r", 1.0, "A")]).await.unwrap();
        assert_eq!(output.failed(), 1);
        assert!(embedding.requests().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_fatal() {
        let embedding = Arc::new(RecordingEmbeddingService::indexed().fail_on_request(1));
        let pipeline = Pipeline::with_clients(
            Arc::new(completion()),
            embedding,
            load_catalog().unwrap(),
            &test_config(),
        );

        let err = pipeline.run(&rows()).await.unwrap_err();
        assert!(
            matches!(err, PipelineError::Embedding(EmbeddingError::Request { chunk: 1, .. })),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_short_embedding_response_is_fatal() {
        let embedding = Arc::new(RecordingEmbeddingService::scripted(vec![vec![vec![1.0]]]));
        let pipeline = Pipeline::with_clients(
            Arc::new(completion()),
            embedding,
            load_catalog().unwrap(),
            &test_config(),
        );

        let row = rows()[0].clone();
        let err = pipeline.run(&[row.clone(), row]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(EmbeddingError::CountMismatch { .. })));
    }

    #[tokio::test]
    async fn test_run_and_store_persists_successes() {
        let store = MemoryReceiptStore::new(16);
        let pipeline = Pipeline::with_clients(
            Arc::new(completion()),
            Arc::new(MockEmbeddingService::new(16)),
            load_catalog().unwrap(),
            &test_config(),
        );

        let output = pipeline.run_and_store(&rows(), &store).await.unwrap();
        assert_eq!(output.succeeded(), 3);

        let stored = store.all_records().await.unwrap();
        let abbrs: Vec<_> = stored.iter().map(|r| r.record.product_abbr.as_str()).collect();
        assert_eq!(abbrs, vec!["GRANATAPEL", "KASTEN LEER", "BIO VOLLM"]);
    }

    #[tokio::test]
    async fn test_store_dimension_mismatch_is_fatal() {
        let store = MemoryReceiptStore::new(8);
        let pipeline = Pipeline::with_clients(
            Arc::new(completion()),
            Arc::new(MockEmbeddingService::new(16)),
            load_catalog().unwrap(),
            &test_config(),
        );

        let err = pipeline.run_and_store(&rows(), &store).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_catalog_file_fails_the_run() {
        let embedding = Arc::new(RecordingEmbeddingService::indexed());
        let pipeline = Pipeline::with_clients(
            Arc::new(completion()),
            embedding.clone(),
            CatalogSource::File("/nonexistent/categories.json".into()),
            &test_config(),
        );

        let err = pipeline.run(&rows()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Catalog(_)));
        assert!(embedding.requests().is_empty());
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let err = Pipeline::from_config(&PipelineConfig::default()).err().unwrap();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use receipt_core::{
    create_embedding_service, BatchResolver, DistanceMetric, EmbeddingServiceConfig,
    MistralCompletionClient, Pipeline, PipelineConfig, ProductEntry, ProductImporter,
    ResolvedItem, ScanRow, ScoredProduct, ScoredRecord, SearchTarget, SemanticSearch,
};
use receipt_state_postgres::{PostgresConfig, PostgresProductStore, PostgresReceiptStore};

#[derive(Parser, Debug)]
#[command(
    name = "receipt",
    about = "Resolve, categorise and embed abbreviated supermarket receipt items"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve comma-separated receipt items and print the results as JSON
    Resolve {
        /// Items such as "GRANATAPEL, KASTEN LEER"
        items: String,
    },
    /// Run the full pipeline over a JSON array of scan rows
    Run {
        /// File with `[{"receipt_id", "price", "product_abbr"}, ...]`
        #[arg(long)]
        input: PathBuf,

        /// Persist successful rows to Postgres (needs DATABASE_URL)
        #[arg(long, default_value_t = false)]
        store: bool,
    },
    /// Embed the store's product assortment into Postgres (needs DATABASE_URL)
    Import {
        /// File with `[{"name", "price", "category"}, ...]`
        #[arg(long)]
        input: PathBuf,
    },
    /// Search stored rows or assortment products by meaning
    Search {
        query: String,

        /// Number of rows to return
        #[arg(short, default_value_t = 5)]
        k: usize,

        #[arg(long, default_value = "cosine")]
        metric: DistanceMetric,

        /// `receipts` or `products`
        #[arg(long, default_value = "receipts")]
        target: SearchTarget,
    },
}

/// Splits a comma-separated item list, dropping blanks.
fn parse_items(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ResolveLine {
    Resolved(ResolvedItem),
    Failed {
        index: usize,
        product_abbr: String,
        error: String,
    },
}

#[derive(Serialize)]
struct SearchHit<'a> {
    id: i64,
    distance: f32,
    receipt_id: &'a str,
    price: f64,
    product_abbr: &'a str,
    product_name: &'a str,
    category_main: &'a str,
    category_sub: &'a str,
}

impl<'a> From<&'a ScoredRecord> for SearchHit<'a> {
    fn from(hit: &'a ScoredRecord) -> Self {
        Self {
            id: hit.id,
            distance: hit.distance,
            receipt_id: &hit.record.receipt_id,
            price: hit.record.price,
            product_abbr: &hit.record.product_abbr,
            product_name: &hit.record.product_name,
            category_main: &hit.record.category_main,
            category_sub: &hit.record.category_sub,
        }
    }
}

#[derive(Serialize)]
struct ProductHit<'a> {
    id: i64,
    distance: f32,
    name: &'a str,
    price: f64,
    category: &'a str,
}

impl<'a> From<&'a ScoredProduct> for ProductHit<'a> {
    fn from(hit: &'a ScoredProduct) -> Self {
        Self {
            id: hit.id,
            distance: hit.distance,
            name: &hit.record.name,
            price: hit.record.price,
            category: &hit.record.category,
        }
    }
}

fn postgres_config(config: &PipelineConfig) -> Result<PostgresConfig> {
    PostgresConfig::from_env(config.embedding_dimension)
        .context("DATABASE_URL must be set to use the Postgres store")
}

async fn connect_store(config: &PipelineConfig) -> Result<PostgresReceiptStore> {
    PostgresReceiptStore::connect(&postgres_config(config)?)
        .await
        .context("Failed to open the Postgres store")
}

async fn connect_product_store(config: &PipelineConfig) -> Result<PostgresProductStore> {
    PostgresProductStore::connect(&postgres_config(config)?)
        .await
        .context("Failed to open the Postgres product store")
}

fn read_json<T: serde::de::DeserializeOwned>(input: &Path, what: &str) -> Result<T> {
    let raw = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {} from {:?}", what, input))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {} in {:?}", what, input))
}

async fn resolve(config: &PipelineConfig, raw_items: &str) -> Result<()> {
    let items = parse_items(raw_items);
    let catalog = config.load_catalog().context("Failed to load categories")?;
    let client = MistralCompletionClient::new(&config.mistral_config()?, config.completion.clone())?;
    let resolver = BatchResolver::new(Arc::new(client), config.resolver_options());

    let lines: Vec<ResolveLine> = resolver
        .resolve_all(&items, &catalog)
        .await
        .into_iter()
        .map(|result| match result {
            Ok(item) => ResolveLine::Resolved(item),
            Err(failure) => ResolveLine::Failed {
                index: failure.index,
                product_abbr: failure.product_abbr,
                error: failure.error.to_string(),
            },
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&lines)?);
    Ok(())
}

async fn run(config: &PipelineConfig, input: &Path, store: bool) -> Result<()> {
    let rows: Vec<ScanRow> = read_json(input, "scan rows")?;
    let pipeline = Pipeline::from_config(config).context("Failed to build pipeline")?;

    let output = if store {
        let store = connect_store(config).await?;
        pipeline.run_and_store(&rows, &store).await?
    } else {
        pipeline.run(&rows).await?
    };
    info!(
        succeeded = output.succeeded(),
        failed = output.failed(),
        "Processed scan rows"
    );
    println!("{}", serde_json::to_string_pretty(&output.rows)?);
    Ok(())
}

async fn import(config: &PipelineConfig, input: &Path) -> Result<()> {
    let entries: Vec<ProductEntry> = read_json(input, "products")?;
    let importer = ProductImporter::from_config(config).context("Failed to build importer")?;
    let store = connect_product_store(config).await?;

    let inserted = importer.import(&entries, &store).await?;
    info!(inserted, "Imported products");
    println!("{}", serde_json::json!({ "inserted": inserted }));
    Ok(())
}

async fn search(
    config: &PipelineConfig,
    query: &str,
    k: usize,
    metric: DistanceMetric,
    target: SearchTarget,
) -> Result<()> {
    let embedding = create_embedding_service(EmbeddingServiceConfig::Mistral {
        config: config.mistral_config()?,
        model: config.embedding_model.clone(),
    })?;

    let output = match target {
        SearchTarget::Receipts => {
            let store = connect_store(config).await?;
            let search = SemanticSearch::new(embedding, Arc::new(store)).with_metric(metric);
            let hits = search.search(query, k).await?;
            let hits: Vec<SearchHit> = hits.iter().map(SearchHit::from).collect();
            serde_json::to_string_pretty(&hits)?
        }
        SearchTarget::Products => {
            let store = connect_product_store(config).await?;
            let search = SemanticSearch::for_products(embedding, Arc::new(store)).with_metric(metric);
            let hits = search.search_products(query, k).await?;
            let hits: Vec<ProductHit> = hits.iter().map(ProductHit::from).collect();
            serde_json::to_string_pretty(&hits)?
        }
    };
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    receipt_core::init_tracing();

    let cli = Cli::parse();
    let config = PipelineConfig::load();

    match cli.command {
        Command::Resolve { items } => resolve(&config, &items).await,
        Command::Run { input, store } => run(&config, &input, store).await,
        Command::Import { input } => import(&config, &input).await,
        Command::Search {
            query,
            k,
            metric,
            target,
        } => search(&config, &query, k, metric, target).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_items_trims_and_drops_blanks() {
        assert_eq!(
            parse_items(" GRANATAPEL,KASTEN LEER , ,BIO VOLLM"),
            vec!["GRANATAPEL", "KASTEN LEER", "BIO VOLLM"]
        );
        assert!(parse_items(" , ").is_empty());
    }

    #[test]
    fn test_cli_parses_search_arguments() {
        let cli = Cli::try_parse_from(["receipt", "search", "Obst", "-k", "3", "--metric", "l2"]).unwrap();
        match cli.command {
            Command::Search {
                query,
                k,
                metric,
                target,
            } => {
                assert_eq!(query, "Obst");
                assert_eq!(k, 3);
                assert_eq!(metric, DistanceMetric::L2);
                assert_eq!(target, SearchTarget::Receipts);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_run_arguments() {
        let cli = Cli::try_parse_from(["receipt", "run", "--input", "scans.json", "--store"]).unwrap();
        assert!(matches!(cli.command, Command::Run { store: true, .. }));
    }

    #[test]
    fn test_cli_parses_product_search_and_import() {
        let cli = Cli::try_parse_from(["receipt", "search", "Granatapfel", "--target", "products"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Search { target: SearchTarget::Products, k: 5, .. }
        ));

        let cli = Cli::try_parse_from(["receipt", "import", "--input", "assortment.json"]).unwrap();
        match cli.command {
            Command::Import { input } => assert_eq!(input, PathBuf::from("assortment.json")),
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["receipt", "search", "x", "--target", "shelf"]).is_err());
    }
}

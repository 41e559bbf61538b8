//! Round trips against a real database; skipped unless DATABASE_URL is set.

use pretty_assertions::assert_eq;
use receipt_core::{DistanceMetric, ProductRecord, ProductStore, ReceiptRecord, ReceiptStore};
use receipt_state_postgres::schema::quote_ident;
use receipt_state_postgres::{
    PostgresConfig, PostgresConnection, PostgresProductStore, PostgresReceiptStore,
};

fn test_config(table: &str) -> Option<PostgresConfig> {
    dotenv::dotenv().ok();
    let mut config = match PostgresConfig::from_env(3) {
        Some(config) => config,
        None => {
            eprintln!("Skipping test: DATABASE_URL not set");
            return None;
        }
    };
    config.table = table.to_string();
    config.product_table = format!("{table}_products");
    config.max_connections = 2;
    Some(config)
}

async fn truncate(conn: &PostgresConnection, table: &str) {
    let sql = format!("TRUNCATE {} RESTART IDENTITY", quote_ident(table));
    sqlx::query(&sql).execute(conn.pool()).await.unwrap();
}

async fn connect(table: &str) -> Option<PostgresReceiptStore> {
    let config = test_config(table)?;
    let store = PostgresReceiptStore::connect(&config).await.unwrap();
    truncate(store.connection(), table).await;
    Some(store)
}

fn record(abbr: &str, embedding: [f32; 3]) -> ReceiptRecord {
    ReceiptRecord {
        receipt_id: "bon-1".to_string(),
        price: 1.25,
        product_abbr: abbr.to_string(),
        product_name: abbr.to_lowercase(),
        category_main: "Getränke".to_string(),
        category_sub: "Wasser".to_string(),
        embedding: embedding.to_vec(),
    }
}

#[tokio::test]
async fn test_insert_and_nearest() {
    let Some(store) = connect("receipts_test_nearest").await else {
        return;
    };

    let inserted = store
        .insert_records(&[
            record("NEAR", [1.0, 0.1, 0.0]),
            record("FAR", [-1.0, 0.0, 0.0]),
            record("MID", [0.0, 1.0, 0.0]),
        ])
        .await
        .unwrap();
    assert_eq!(inserted, 3);

    let all = store.all_records().await.unwrap();
    let ids: Vec<_> = all.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(all[0].record, record("NEAR", [1.0, 0.1, 0.0]));

    let hits = store
        .nearest(&[1.0, 0.0, 0.0], 2, DistanceMetric::Cosine)
        .await
        .unwrap();
    let abbrs: Vec<_> = hits.iter().map(|h| h.record.product_abbr.as_str()).collect();
    assert_eq!(abbrs, vec!["NEAR", "MID"]);

    let hits = store
        .nearest(&[0.0, 1.0, 0.0], 1, DistanceMetric::L2)
        .await
        .unwrap();
    assert_eq!(hits[0].record.product_abbr, "MID");
}

#[tokio::test]
async fn test_product_table_round_trip() {
    let Some(config) = test_config("receipts_test_products") else {
        return;
    };
    let store = PostgresProductStore::connect(&config).await.unwrap();
    truncate(store.connection(), &config.product_table).await;

    let product = |name: &str, embedding: [f32; 3]| ProductRecord {
        name: name.to_string(),
        price: 0.99,
        category: "Obst & Gemüse".to_string(),
        embedding: embedding.to_vec(),
    };
    store
        .insert_products(&[
            product("Banane", [0.0, 1.0, 0.0]),
            product("Granatapfel", [1.0, 0.0, 0.0]),
        ])
        .await
        .unwrap();

    let all = store.all_products().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].record, product("Banane", [0.0, 1.0, 0.0]));

    let hits = store
        .nearest_products(&[0.9, 0.1, 0.0], 1, DistanceMetric::Cosine)
        .await
        .unwrap();
    assert_eq!(hits[0].record.name, "Granatapfel");
}

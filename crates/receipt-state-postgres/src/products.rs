use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{debug, instrument};

use receipt_core::{
    DistanceMetric, ProductRecord, ProductStore, ScoredProduct, StorageError, StoredProduct,
};

use crate::schema::quote_ident;
use crate::store::{db_error, distance_operator};
use crate::{PostgresConfig, PostgresConnection};

const COLUMNS: &str = "id, name, price, category, embedding";

/// Postgres implementation of the ProductStore
#[derive(Clone)]
pub struct PostgresProductStore {
    conn: PostgresConnection,
    table: String,
    dimension: usize,
}

impl PostgresProductStore {
    pub fn new(conn: PostgresConnection, table: impl Into<String>, dimension: usize) -> Self {
        Self {
            conn,
            table: table.into(),
            dimension,
        }
    }

    /// Connects, ensures the schema if configured, and returns the store
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StorageError> {
        let conn = PostgresConnection::new(config).await?;
        Ok(Self::new(
            conn,
            config.product_table.clone(),
            config.embedding_dimension,
        ))
    }

    pub fn connection(&self) -> &PostgresConnection {
        &self.conn
    }

    fn check_dimension(&self, actual: usize) -> Result<(), StorageError> {
        if actual != self.dimension {
            return Err(StorageError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    pub(crate) fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (name, price, category, embedding) VALUES ($1, $2, $3, $4)",
            quote_ident(&self.table)
        )
    }

    pub(crate) fn nearest_sql(&self, metric: DistanceMetric) -> String {
        let op = distance_operator(metric);
        format!(
            "SELECT {COLUMNS}, (embedding {op} $1)::REAL AS distance
             FROM {}
             ORDER BY embedding {op} $1, id
             LIMIT $2",
            quote_ident(&self.table)
        )
    }
}

fn product_from_row(row: &PgRow) -> Result<ProductRecord, sqlx::Error> {
    let embedding: Vector = row.try_get("embedding")?;
    Ok(ProductRecord {
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        category: row.try_get("category")?,
        embedding: embedding.to_vec(),
    })
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    #[instrument(skip(self, products), fields(table = %self.table, products = products.len()))]
    async fn insert_products(&self, products: &[ProductRecord]) -> Result<usize, StorageError> {
        for product in products {
            self.check_dimension(product.embedding.len())?;
        }
        if products.is_empty() {
            return Ok(0);
        }

        let sql = self.insert_sql();
        let mut tx = self
            .conn
            .pool()
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;
        for product in products {
            sqlx::query(&sql)
                .bind(&product.name)
                .bind(product.price)
                .bind(&product.category)
                .bind(Vector::from(product.embedding.clone()))
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to insert product"))?;
        }
        tx.commit()
            .await
            .map_err(db_error("Failed to commit products"))?;

        debug!("Inserted products");
        Ok(products.len())
    }

    async fn all_products(&self) -> Result<Vec<StoredProduct>, StorageError> {
        let sql = format!("SELECT {COLUMNS} FROM {} ORDER BY id", quote_ident(&self.table));
        let rows = sqlx::query(&sql)
            .fetch_all(self.conn.pool())
            .await
            .map_err(db_error("Failed to load products"))?;

        rows.iter()
            .map(|row| {
                Ok(StoredProduct {
                    id: row.try_get("id")?,
                    record: product_from_row(row)?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(db_error("Failed to decode product"))
    }

    #[instrument(skip(self, query), fields(table = %self.table))]
    async fn nearest_products(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredProduct>, StorageError> {
        self.check_dimension(query.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(k)
            .map_err(|_| StorageError::InvalidInput(format!("k is too large: {k}")))?;

        let rows = sqlx::query(&self.nearest_sql(metric))
            .bind(Vector::from(query.to_vec()))
            .bind(limit)
            .fetch_all(self.conn.pool())
            .await
            .map_err(db_error("Nearest-product query failed"))?;

        rows.iter()
            .map(|row| {
                Ok(ScoredProduct {
                    id: row.try_get("id")?,
                    distance: row.try_get("distance")?,
                    record: product_from_row(row)?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(db_error("Failed to decode product hit"))
    }
}

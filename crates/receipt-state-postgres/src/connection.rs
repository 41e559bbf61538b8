use std::time::Duration;

use receipt_core::StorageError;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

use crate::schema::{product_schema_statements, schema_statements};
use crate::PostgresConfig;

/// Database connection manager for Postgres
#[derive(Clone)]
pub struct PostgresConnection {
    pool: PgPool,
}

impl PostgresConnection {
    /// Create a new PostgreSQL connection pool
    pub async fn new(config: &PostgresConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.connection_string)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to connect to PostgreSQL: {}", e)))?;
        debug!("Connected to PostgreSQL database");

        let conn = Self { pool };
        if config.ensure_schema {
            conn.ensure_schema(&config.table, config.embedding_dimension)
                .await?;
            conn.ensure_product_schema(&config.product_table, config.embedding_dimension)
                .await?;
        }
        Ok(conn)
    }

    /// Wraps an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `vector` extension and the receipts table if missing
    pub async fn ensure_schema(&self, table: &str, dimension: usize) -> Result<(), StorageError> {
        info!(table, dimension, "Ensuring receipt schema");
        self.execute_all(schema_statements(table, dimension)?).await
    }

    /// Creates the `vector` extension and the products table if missing
    pub async fn ensure_product_schema(
        &self,
        table: &str,
        dimension: usize,
    ) -> Result<(), StorageError> {
        info!(table, dimension, "Ensuring product schema");
        self.execute_all(product_schema_statements(table, dimension)?)
            .await
    }

    async fn execute_all(&self, statements: Vec<(&'static str, String)>) -> Result<(), StorageError> {
        for (name, sql) in statements {
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Database(format!("Failed to run '{}': {}", name, e)))?;
        }
        Ok(())
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

//! DDL for the receipts and products tables

use receipt_core::StorageError;

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

fn check_table(table: &str, dimension: usize) -> Result<(), StorageError> {
    if table.trim().is_empty() {
        return Err(StorageError::InvalidInput("table name is required".to_string()));
    }
    if dimension == 0 {
        return Err(StorageError::InvalidInput(
            "embedding dimension must be positive".to_string(),
        ));
    }
    Ok(())
}

const CREATE_EXTENSION: (&str, &str) =
    ("create_vector_extension", "CREATE EXTENSION IF NOT EXISTS vector");

/// Named statements creating the receipts schema, in execution order.
pub fn schema_statements(
    table: &str,
    dimension: usize,
) -> Result<Vec<(&'static str, String)>, StorageError> {
    check_table(table, dimension)?;

    Ok(vec![
        (CREATE_EXTENSION.0, CREATE_EXTENSION.1.to_string()),
        (
            "create_receipts_table",
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id BIGSERIAL PRIMARY KEY,
                    receipt_id TEXT NOT NULL,
                    price DOUBLE PRECISION NOT NULL,
                    product_abbr TEXT NOT NULL,
                    product_name TEXT NOT NULL,
                    category_main TEXT NOT NULL,
                    category_sub TEXT NOT NULL,
                    embedding VECTOR({dimension}) NOT NULL
                )",
                quote_ident(table)
            ),
        ),
    ])
}

/// Named statements creating the products schema, in execution order.
pub fn product_schema_statements(
    table: &str,
    dimension: usize,
) -> Result<Vec<(&'static str, String)>, StorageError> {
    check_table(table, dimension)?;

    Ok(vec![
        (CREATE_EXTENSION.0, CREATE_EXTENSION.1.to_string()),
        (
            "create_products_table",
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id BIGSERIAL PRIMARY KEY,
                    name TEXT NOT NULL,
                    price DOUBLE PRECISION NOT NULL,
                    category TEXT NOT NULL,
                    embedding VECTOR({dimension}) NOT NULL
                )",
                quote_ident(table)
            ),
        ),
    ])
}

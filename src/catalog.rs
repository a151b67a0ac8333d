//! Schema lister: the names of the tables in the configured schema.

use crate::config::DbConfig;
use crate::error::{AssistantError, Result};
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;
use tracing::info;

const TABLES_SQL: &str =
    "SELECT table_name FROM information_schema.tables WHERE table_schema = ?";

/// List the tables in the configured schema, in catalog order.
///
/// The connection is scoped to this call: opened here, closed before the
/// result is returned, even when the metadata query fails. A connect failure
/// is a `Connection` error and a query failure is a `Query` error; neither
/// is retried and neither produces a silent empty list.
pub async fn list_tables(config: &DbConfig) -> Result<Vec<String>> {
    config.validate()?;

    let pool = MySqlPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.connection_url())
        .await
        .map_err(|e| {
            AssistantError::Connection(format!(
                "Failed to connect to {}:{}: {}",
                config.host, config.port, e
            ))
        })?;

    let result = sqlx::query_scalar::<_, String>(TABLES_SQL)
        .bind(&config.database)
        .fetch_all(&pool)
        .await;
    pool.close().await;

    let tables = result.map_err(|e| {
        AssistantError::Query(format!(
            "Failed to list tables in {}: {}",
            config.database, e
        ))
    })?;

    info!("Found {} tables in schema {}", tables.len(), config.database);
    Ok(tables)
}

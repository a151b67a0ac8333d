//! Lazy table accessor bound to one table in the configured schema.
//!
//! A [`TableConnector`] is created when the user selects a table and
//! discarded when the selection changes. It holds no open connection:
//! binding is pure construction, and the first `fetch_*` call opens the
//! connection. The orchestrator only sees the [`TableSource`] trait, so
//! tests can substitute a stub that never touches a database.

use crate::config::DbConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo};

/// One column of a table schema, as reported by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// Capability to lazily supply one table's schema and a sample of its rows.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Name of the bound table.
    fn table(&self) -> &str;

    /// Column names and types, in ordinal order.
    async fn fetch_schema(&self) -> Result<Vec<ColumnInfo>>;

    /// Up to `limit` rows as JSON objects. Never materializes the whole table.
    async fn fetch_rows(&self, limit: usize) -> Result<Vec<Value>>;
}

#[derive(Debug)]
pub struct TableConnector {
    table: String,
    database: String,
    pool: MySqlPool,
}

impl TableConnector {
    /// Bind a connector to `table`. No network I/O happens here; the pool is
    /// lazy and the first fetch opens the connection.
    ///
    /// Fails with a `Config` error if the table name is blank or not a plain
    /// SQL identifier, or if the credentials are structurally incomplete.
    pub fn bind(table: &str, config: &DbConfig) -> Result<Self> {
        if table.trim().is_empty() {
            return Err(AssistantError::Config("table name is empty".to_string()));
        }
        if !is_plain_identifier(table) {
            return Err(AssistantError::Config(format!(
                "invalid table name: {}",
                table
            )));
        }
        config.validate()?;

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect_lazy(&config.connection_url())
            .map_err(|e| {
                AssistantError::Config(format!("invalid database configuration: {}", e))
            })?;

        Ok(Self {
            table: table.to_string(),
            database: config.database.clone(),
            pool,
        })
    }
}

#[async_trait]
impl TableSource for TableConnector {
    fn table(&self) -> &str {
        &self.table
    }

    async fn fetch_schema(&self) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
        )
        .bind(&self.database)
        .bind(&self.table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AssistantError::Query(format!("Failed to read schema for {}: {}", self.table, e))
        })?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| ColumnInfo { name, data_type })
            .collect())
    }

    async fn fetch_rows(&self, limit: usize) -> Result<Vec<Value>> {
        // The table name is validated as a plain identifier at bind time.
        let sql = format!("SELECT * FROM `{}` LIMIT ?", self.table);
        let rows = sqlx::query(&sql)
            .bind(limit as u32)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AssistantError::Query(format!(
                    "Failed to read rows from {}: {}",
                    self.table, e
                ))
            })?;

        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn row_to_json(row: &MySqlRow) -> Value {
    let mut object = serde_json::Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        object.insert(
            column.name().to_string(),
            decode_value(row, i, column.type_info().name()),
        );
    }
    Value::Object(object)
}

/// Decode one MySQL value into JSON by its driver type name. Values that
/// fail to decode become `null` rather than failing the whole preview.
fn decode_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match type_name {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "TINYINT" => row
            .try_get::<Option<i8>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "MEDIUMINT" | "INT" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "TINYINT UNSIGNED" => row
            .try_get::<Option<u8>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "SMALLINT UNSIGNED" => row
            .try_get::<Option<u16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => row
            .try_get::<Option<u32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .and_then(|v| serde_json::Number::from_f64(v as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        "DATETIME" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_rfc3339()))
            .unwrap_or(Value::Null),
        "JSON" => row
            .try_get::<Option<Value>, _>(index)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        // CHAR/VARCHAR/TEXT/ENUM/SET/DECIMAL and anything else textual
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

//! Data assistant: routes a question about one table through the LLM backend.
//!
//! The assistant composes a single request from the fixed system
//! instruction, the table context supplied lazily by the selected
//! [`TableSource`], and the user's question. Failures are rendered as an
//! error response for the user; nothing here panics or retries.

use crate::connector::{ColumnInfo, TableSource};
use crate::error::Result;
use crate::llm::ChatBackend;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub const NOT_READY_MESSAGE: &str = "Connector is not initialized or no data is loaded.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You're a very knowledgeable data scientist who \
     provides accurate and eloquent answers to historical questions.";

/// How many rows of the selected table are sent to the backend as context.
const PREVIEW_ROW_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    /// Free-text answer from the backend.
    Answer,
    /// Error message rendered inline; the user may resubmit immediately.
    Error,
}

/// Response from the assistant, either an answer or an error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub response_type: ResponseType,
    pub answer: String,
}

impl AssistantResponse {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Answer,
            answer: text.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Error,
            answer: message.into(),
        }
    }
}

pub struct DataAssistant {
    backend: Arc<dyn ChatBackend>,
    system_prompt: String,
}

impl DataAssistant {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(backend: Arc<dyn ChatBackend>, system_prompt: impl Into<String>) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
        }
    }

    /// Answer a question about the currently selected table.
    ///
    /// Rejects before any network call when no table is selected or the
    /// question is blank. Backend and context-fetch failures come back as an
    /// error response with the underlying description; they are never
    /// propagated out of the orchestrator.
    pub async fn ask(&self, source: Option<&dyn TableSource>, question: &str) -> AssistantResponse {
        let source = match source {
            Some(source) => source,
            None => {
                warn!("Question submitted with no table selected");
                return AssistantResponse::error(NOT_READY_MESSAGE);
            }
        };
        if question.trim().is_empty() {
            warn!("Empty question submitted for table {}", source.table());
            return AssistantResponse::error(NOT_READY_MESSAGE);
        }

        match self.generate(source, question).await {
            Ok(text) => AssistantResponse::answer(text),
            Err(e) => {
                warn!("Failed to generate response: {}", e);
                AssistantResponse::error(format!(
                    "An error occurred while generating the response: {}",
                    e
                ))
            }
        }
    }

    async fn generate(&self, source: &dyn TableSource, question: &str) -> Result<String> {
        let schema = source.fetch_schema().await?;
        let rows = source.fetch_rows(PREVIEW_ROW_LIMIT).await?;
        let context = build_table_context(source.table(), &schema, &rows)?;

        info!(
            "Asking about table {} ({} columns, {} sample rows)",
            source.table(),
            schema.len(),
            rows.len()
        );
        self.backend
            .complete(&self.system_prompt, &context, question)
            .await
    }
}

/// Render the table context sent to the backend: name, columns, and a row
/// sample as pretty JSON.
pub fn build_table_context(table: &str, schema: &[ColumnInfo], rows: &[Value]) -> Result<String> {
    let columns: Vec<String> = schema
        .iter()
        .map(|c| format!("- {} ({})", c.name, c.data_type))
        .collect();

    Ok(format!(
        "TABLE: {}\n\nCOLUMNS:\n{}\n\nSAMPLE ROWS:\n{}",
        table,
        columns.join("\n"),
        serde_json::to_string_pretty(rows)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_table_context() {
        let schema = vec![
            ColumnInfo {
                name: "id".to_string(),
                data_type: "int".to_string(),
            },
            ColumnInfo {
                name: "total".to_string(),
                data_type: "decimal".to_string(),
            },
        ];
        let rows = vec![serde_json::json!({"id": 1, "total": "19.99"})];

        let context = build_table_context("orders", &schema, &rows).unwrap();

        assert!(context.starts_with("TABLE: orders"));
        assert!(context.contains("- id (int)"));
        assert!(context.contains("- total (decimal)"));
        assert!(context.contains("19.99"));
    }
}

//! End-to-end tests for the question/answer flow, with the database and the
//! LLM backend replaced by stubs.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tablechat::assistant::{DataAssistant, ResponseType, NOT_READY_MESSAGE};
use tablechat::connector::{ColumnInfo, TableSource};
use tablechat::error::{AssistantError, Result};
use tablechat::llm::ChatBackend;
use tablechat::session::SessionContext;

/// In-memory table source with a fixed schema and row sample.
struct StubSource {
    table: String,
    columns: Vec<ColumnInfo>,
    rows: Vec<Value>,
}

impl StubSource {
    fn orders() -> Self {
        Self {
            table: "orders".to_string(),
            columns: vec![
                column("order_id", "int"),
                column("customer_id", "int"),
                column("total", "decimal"),
            ],
            rows: vec![
                serde_json::json!({"order_id": 1, "customer_id": 10, "total": "19.99"}),
                serde_json::json!({"order_id": 2, "customer_id": 11, "total": "5.00"}),
            ],
        }
    }

    fn customers() -> Self {
        Self {
            table: "customers".to_string(),
            columns: vec![column("customer_id", "int"), column("name", "varchar")],
            rows: vec![serde_json::json!({"customer_id": 10, "name": "Acme"})],
        }
    }
}

fn column(name: &str, data_type: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        data_type: data_type.to_string(),
    }
}

#[async_trait]
impl TableSource for StubSource {
    fn table(&self) -> &str {
        &self.table
    }

    async fn fetch_schema(&self) -> Result<Vec<ColumnInfo>> {
        Ok(self.columns.clone())
    }

    async fn fetch_rows(&self, limit: usize) -> Result<Vec<Value>> {
        Ok(self.rows.iter().take(limit).cloned().collect())
    }
}

/// Backend that records every call and echoes the question back.
#[derive(Default)]
struct EchoBackend {
    calls: AtomicUsize,
    last_context: Mutex<Option<String>>,
}

impl EchoBackend {
    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_context(&self) -> Option<String> {
        self.last_context.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for EchoBackend {
    async fn complete(
        &self,
        _system_prompt: &str,
        context: &str,
        question: &str,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock().unwrap() = Some(context.to_string());
        Ok(format!("echo: {}", question))
    }
}

/// Backend that fails on every call.
#[derive(Default)]
struct FailingBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatBackend for FailingBackend {
    async fn complete(&self, _system: &str, _context: &str, _question: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AssistantError::Backend("stub backend exploded".to_string()))
    }
}

#[tokio::test]
async fn test_ask_without_selection_is_rejected_before_backend() {
    let backend = Arc::new(EchoBackend::default());
    let assistant = DataAssistant::new(backend.clone());

    let response = assistant.ask(None, "how many rows?").await;

    assert_eq!(response.response_type, ResponseType::Error);
    assert_eq!(response.answer, NOT_READY_MESSAGE);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_blank_question_is_rejected_before_backend() {
    let backend = Arc::new(EchoBackend::default());
    let assistant = DataAssistant::new(backend.clone());
    let source = StubSource::orders();

    for question in ["", "   ", "\n\t"] {
        let response = assistant.ask(Some(&source), question).await;
        assert_eq!(response.response_type, ResponseType::Error);
        assert_eq!(response.answer, NOT_READY_MESSAGE);
    }
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_question_reaches_backend_unmodified() {
    let backend = Arc::new(EchoBackend::default());
    let assistant = DataAssistant::new(backend.clone());
    let source = StubSource::orders();

    let response = assistant.ask(Some(&source), "what is X?").await;

    assert_eq!(response.response_type, ResponseType::Answer);
    assert_eq!(response.answer, "echo: what is X?");
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn test_backend_failure_is_surfaced_not_raised() {
    let backend = Arc::new(FailingBackend::default());
    let assistant = DataAssistant::new(backend.clone());
    let source = StubSource::orders();

    let response = assistant.ask(Some(&source), "how many rows?").await;

    assert_eq!(response.response_type, ResponseType::Error);
    assert!(response
        .answer
        .starts_with("An error occurred while generating the response:"));
    assert!(response.answer.contains("stub backend exploded"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_session_flow_uses_selected_table() {
    let backend = Arc::new(EchoBackend::default());
    let assistant = DataAssistant::new(backend.clone());

    let mut session =
        SessionContext::new(vec!["orders".to_string(), "customers".to_string()]);
    assert_eq!(session.tables(), ["orders", "customers"]);
    assert!(session.selected_table().is_none());

    // Asking before any table is selected never reaches the backend.
    let response = assistant.ask(session.source(), "how many rows?").await;
    assert_eq!(response.response_type, ResponseType::Error);
    assert_eq!(backend.call_count(), 0);

    session.select(Box::new(StubSource::orders()));
    assert_eq!(session.selected_table(), Some("orders"));

    let response = assistant.ask(session.source(), "how many rows?").await;
    assert_eq!(response.response_type, ResponseType::Answer);
    assert_eq!(backend.call_count(), 1);

    // The context comes from the orders handle, not customers.
    let context = backend.last_context().unwrap();
    assert!(context.contains("TABLE: orders"));
    assert!(context.contains("order_id"));
    assert!(!context.contains("customers"));
}

#[tokio::test]
async fn test_selection_replaces_previous_handle() {
    let backend = Arc::new(EchoBackend::default());
    let assistant = DataAssistant::new(backend.clone());

    let mut session =
        SessionContext::new(vec!["orders".to_string(), "customers".to_string()]);
    session.select(Box::new(StubSource::orders()));
    session.select(Box::new(StubSource::customers()));
    assert_eq!(session.selected_table(), Some("customers"));

    let response = assistant.ask(session.source(), "who are they?").await;
    assert_eq!(response.response_type, ResponseType::Answer);

    let context = backend.last_context().unwrap();
    assert!(context.contains("TABLE: customers"));
    assert!(!context.contains("order_id"));

    session.clear_selection();
    assert!(session.source().is_none());
}

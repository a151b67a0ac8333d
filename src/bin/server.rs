//! HTTP server for the tablechat UI.
//! Serves the single page and its JSON API using tokio directly.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tablechat::assistant::DataAssistant;
use tablechat::catalog;
use tablechat::config::{DbConfig, LlmConfig};
use tablechat::connector::TableConnector;
use tablechat::error::AssistantError;
use tablechat::llm::LlmClient;
use tablechat::session::SessionContext;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared server state. Session contexts are keyed by id and locked
/// individually, so one session's in-flight question never blocks another
/// session.
struct ServerState {
    db: DbConfig,
    assistant: DataAssistant,
    sessions: Mutex<HashMap<Uuid, Arc<Mutex<SessionContext>>>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let db = DbConfig::from_env()?;
    let llm = LlmConfig::from_env()?;
    let assistant = DataAssistant::new(Arc::new(LlmClient::new(llm)));

    let state = Arc::new(ServerState {
        db,
        assistant,
        sessions: Mutex::new(HashMap::new()),
    });

    let listener = TcpListener::bind("0.0.0.0:8080").await?;
    info!("Server listening on http://localhost:8080");

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from {}", addr);
        let state = Arc::clone(&state);
        tokio::spawn(handle_connection(stream, state));
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<ServerState>) {
    use tokio::time::{timeout, Duration};

    // Read the request with a timeout to prevent hanging connections.
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break, // EOF
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    if let Ok(s) = std::str::from_utf8(&buffer) {
                        if s.contains("\r\n\r\n") {
                            // Headers complete; wait for the full body if one
                            // was announced.
                            if let Some(content_length) = extract_content_length(s) {
                                let headers_end = s.find("\r\n\r\n").unwrap() + 4;
                                if buffer.len() >= headers_end + content_length {
                                    break;
                                }
                            } else if n < temp_buf.len() {
                                break;
                            }
                        }
                    }
                    if buffer.len() > 1_000_000 {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read from stream: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    })
    .await;

    if read_result.is_err() {
        warn!("Request read timeout");
        return;
    }

    if buffer.is_empty() {
        return;
    }

    match String::from_utf8(buffer) {
        Ok(request) => {
            let response = handle_request(&request, &state).await;
            if let Err(e) = stream.write_all(response.as_bytes()).await {
                warn!("Failed to write response: {}", e);
            }
        }
        Err(e) => {
            warn!("Failed to parse request as UTF-8: {}", e);
        }
    }
}

fn extract_content_length(request: &str) -> Option<usize> {
    for line in request.lines() {
        if line.to_lowercase().starts_with("content-length:") {
            if let Some(value) = line.split(':').nth(1) {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

async fn handle_request(request: &str, state: &ServerState) -> String {
    let request_line = match request.lines().next() {
        Some(line) => line,
        None => return create_response(400, "Bad Request", "{}"),
    };

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", "{}");
    }

    let method = parts[0];
    let full_path = parts[1];

    let (path_str, query_string) = match full_path.find('?') {
        Some(query_start) => (&full_path[..query_start], Some(&full_path[query_start + 1..])),
        None => (full_path, None),
    };

    // Normalize path (remove trailing slash except for root)
    let mut path = path_str.trim_end_matches('/');
    if path.is_empty() {
        path = "/";
    }

    debug!("Request: {} {}", method, path);

    match (method, path) {
        ("GET", "/") => create_html_response(INDEX_HTML),
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("GET", "/api/health") => {
            create_response(200, "OK", r#"{"status":"ok","service":"tablechat"}"#)
        }
        ("POST", "/api/session") => match handle_create_session(state).await {
            Ok(json) => create_response(200, "OK", &json),
            Err(e) => {
                // A connection or query failure here aborts page load with a
                // visible error, never a silent empty list.
                error!("Failed to create session: {}", e);
                create_response(500, "Internal Server Error", &error_json(&e.to_string()))
            }
        },
        ("GET", "/api/tables") => {
            match handle_list_tables(state, query_param(query_string, "session")).await {
                Ok(json) => create_response(200, "OK", &json),
                Err(e) => create_response(400, "Bad Request", &error_json(&e.to_string())),
            }
        }
        ("POST", "/api/select") => match handle_select(state, json_body(request)).await {
            Ok(json) => create_response(200, "OK", &json),
            Err(e) => create_response(400, "Bad Request", &error_json(&e.to_string())),
        },
        ("POST", "/api/ask") => match handle_ask(state, json_body(request)).await {
            Ok(json) => create_response(200, "OK", &json),
            Err(e) => create_response(400, "Bad Request", &error_json(&e.to_string())),
        },
        _ => create_response(404, "Not Found", r#"{"error":"not found"}"#),
    }
}

fn query_param<'a>(query_string: Option<&'a str>, key: &str) -> Option<&'a str> {
    for param in query_string?.split('&') {
        if let Some((k, v)) = param.split_once('=') {
            if k == key {
                return Some(v);
            }
        }
    }
    None
}

fn json_body(request: &str) -> Option<&str> {
    let body_start = request.find("\r\n\r\n")? + 4;
    let body = request[body_start..].trim();
    let json_start = body.find('{')?;
    Some(&body[json_start..])
}

/// Create a session: fetch the table list once and cache it for the
/// session's lifetime.
async fn handle_create_session(state: &ServerState) -> Result<String, AssistantError> {
    let tables = catalog::list_tables(&state.db).await?;
    let session_id = Uuid::new_v4();

    let context = SessionContext::new(tables.clone());
    state
        .sessions
        .lock()
        .await
        .insert(session_id, Arc::new(Mutex::new(context)));

    info!("Created session {} with {} tables", session_id, tables.len());
    Ok(serde_json::json!({
        "session_id": session_id.to_string(),
        "tables": tables,
    })
    .to_string())
}

async fn lookup_session(
    state: &ServerState,
    session_id: Option<&str>,
) -> Result<Arc<Mutex<SessionContext>>, AssistantError> {
    let session_id = session_id
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AssistantError::Precondition("missing or invalid session id".to_string()))?;

    state
        .sessions
        .lock()
        .await
        .get(&session_id)
        .cloned()
        .ok_or_else(|| AssistantError::Precondition(format!("unknown session: {}", session_id)))
}

async fn handle_list_tables(
    state: &ServerState,
    session_id: Option<&str>,
) -> Result<String, AssistantError> {
    let session = lookup_session(state, session_id).await?;
    let session = session.lock().await;
    Ok(serde_json::json!({ "tables": session.tables() }).to_string())
}

async fn handle_select(state: &ServerState, body: Option<&str>) -> Result<String, AssistantError> {
    #[derive(Deserialize)]
    struct SelectRequest {
        session_id: String,
        table: String,
    }

    let body =
        body.ok_or_else(|| AssistantError::Precondition("JSON body required".to_string()))?;
    let req: SelectRequest = serde_json::from_str(body)?;

    let session = lookup_session(state, Some(&req.session_id)).await?;
    let mut session = session.lock().await;

    if !session.has_table(&req.table) {
        return Err(AssistantError::Precondition(format!(
            "unknown table: {}",
            req.table
        )));
    }

    let connector = TableConnector::bind(&req.table, &state.db)?;
    session.select(Box::new(connector));

    info!("Selected table {}", req.table);
    Ok(serde_json::json!({ "selected": req.table }).to_string())
}

async fn handle_ask(state: &ServerState, body: Option<&str>) -> Result<String, AssistantError> {
    #[derive(Deserialize)]
    struct AskRequest {
        session_id: String,
        question: String,
    }

    let body =
        body.ok_or_else(|| AssistantError::Precondition("JSON body required".to_string()))?;
    let req: AskRequest = serde_json::from_str(body)?;

    let session = lookup_session(state, Some(&req.session_id)).await?;
    // The session stays locked for the duration of the call: one in-flight
    // question per session.
    let session = session.lock().await;

    let response = state.assistant.ask(session.source(), &req.question).await;
    Ok(serde_json::to_string(&response)?)
}

fn error_json(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

fn create_html_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        body.len(),
        body
    )
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>MySQL with Llama-3</title>
<style>
body { font-family: sans-serif; max-width: 640px; margin: 2em auto; padding: 0 1em; }
label { display: block; margin-top: 1em; }
select, input { width: 100%; padding: 0.4em; margin-top: 0.3em; box-sizing: border-box; }
button { margin-top: 1em; padding: 0.5em 1.5em; }
#spinner { margin-top: 1em; color: #666; }
#output { margin-top: 1em; white-space: pre-wrap; }
#output.error { color: #b00020; border: 1px solid #b00020; padding: 0.7em; }
#output.answer { border: 1px solid #ccc; padding: 0.7em; }
.hidden { display: none; }
</style>
</head>
<body>
<h1>MySQL with Llama-3</h1>
<label for="table">Select a table</label>
<select id="table"></select>
<label for="question">Enter your prompt:</label>
<input id="question" type="text">
<button id="generate">Generate</button>
<div id="spinner" class="hidden">Generating response...</div>
<div id="output"></div>
<script>
let sessionId = null;

async function init() {
  const res = await fetch('/api/session', { method: 'POST' });
  if (!res.ok) {
    const e = await res.json();
    showError(e.error || 'Failed to load tables');
    return;
  }
  const data = await res.json();
  sessionId = data.session_id;
  const select = document.getElementById('table');
  for (const name of data.tables) {
    const option = document.createElement('option');
    option.value = name;
    option.textContent = name;
    select.appendChild(option);
  }
  if (data.tables.length > 0) {
    await selectTable(data.tables[0]);
  }
  select.addEventListener('change', () => selectTable(select.value));
}

async function selectTable(table) {
  const res = await fetch('/api/select', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ session_id: sessionId, table: table }),
  });
  if (!res.ok) {
    const e = await res.json();
    showError(e.error || 'Failed to select table');
  }
}

async function generate() {
  const question = document.getElementById('question').value;
  const button = document.getElementById('generate');
  const spinner = document.getElementById('spinner');
  button.disabled = true;
  spinner.classList.remove('hidden');
  try {
    const res = await fetch('/api/ask', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ session_id: sessionId, question: question }),
    });
    const data = await res.json();
    if (data.response_type === 'Error' || data.error) {
      showError(data.answer || data.error);
    } else {
      showAnswer(data.answer);
    }
  } catch (e) {
    showError('Request failed: ' + e);
  } finally {
    button.disabled = false;
    spinner.classList.add('hidden');
  }
}

function showAnswer(text) {
  const output = document.getElementById('output');
  output.className = 'answer';
  output.textContent = text;
}

function showError(text) {
  const output = document.getElementById('output');
  output.className = 'error';
  output.textContent = text;
}

document.getElementById('generate').addEventListener('click', generate);
init();
</script>
</body>
</html>
"##;

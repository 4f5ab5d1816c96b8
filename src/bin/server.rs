//! HTTP server for the roaming insights form
//! Simple HTTP server using tokio and basic HTTP handling

use roaming_insights::agent::contracts::{AskRequest, ErrorResponse};
use roaming_insights::agent::transcript::log_turns;
use roaming_insights::agent::AnswerService;
use roaming_insights::config::AppConfig;
use roaming_insights::error::RoamingError;
use roaming_insights::logging::init_logging;
use roaming_insights::storage::{SqlBackend, UsageStore};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

const MAX_REQUEST_BYTES: usize = 64 * 1024;

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Telecom Roaming Insights</title></head>
<body style="font-family: sans-serif; max-width: 48rem; margin: 2rem auto;">
<h1>Telecom Roaming Insights</h1>
<form id="ask">
  <input id="question" style="width: 100%;" placeholder="Enter your business question">
  <button type="submit">Submit</button>
</form>
<h3>Answer</h3><pre id="answer"></pre>
<h3>Insight</h3><pre id="insight"></pre>
<h3>SQL</h3><pre id="sql"></pre>
<script>
document.getElementById("ask").addEventListener("submit", async (ev) => {
  ev.preventDefault();
  const question = document.getElementById("question").value;
  document.getElementById("answer").textContent = "Analyzing...";
  const res = await fetch("/api/ask", {
    method: "POST",
    headers: {"Content-Type": "application/json"},
    body: JSON.stringify({question}),
  });
  const body = await res.json();
  document.getElementById("answer").textContent = res.ok ? body.answer : body.error;
  document.getElementById("insight").textContent = res.ok ? (body.insight || "") : "";
  document.getElementById("sql").textContent = res.ok ? (body.sql || "") : "";
});
</script>
</body>
</html>
"#;

struct AppState {
    config: AppConfig,
    service: Mutex<Option<Arc<AnswerService>>>,
}

impl AppState {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            service: Mutex::new(None),
        }
    }

    /// Built on first use and kept once it succeeds, so a database ingested
    /// after startup is picked up without a restart.
    fn service(&self) -> Result<Arc<AnswerService>, RoamingError> {
        let mut slot = self
            .service
            .lock()
            .map_err(|_| RoamingError::Config("answer service lock poisoned".to_string()))?;
        if let Some(service) = slot.as_ref() {
            return Ok(Arc::clone(service));
        }
        let service = Arc::new(AnswerService::from_config(&self.config)?);
        info!("Question answering enabled");
        *slot = Some(Arc::clone(&service));
        Ok(service)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;
    let log_path = init_logging(&config.log_dir, "server")?;
    info!("Logging to {}", log_path.display());

    let state = Arc::new(AppState::new(config));
    if let Err(e) = state.service() {
        warn!("Question answering unavailable until fixed: {}", e);
    }

    let listener = TcpListener::bind(&state.config.server_addr).await?;
    info!("Server listening on http://{}", state.config.server_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("New connection from: {}", addr);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            handle_connection(stream, &state).await;
        });
    }
}

async fn handle_connection(mut stream: TcpStream, state: &AppState) {
    match read_request(&mut stream).await {
        Ok(request) => {
            let response = handle_request(&request, state).await;
            if let Err(e) = stream.write_all(response.as_bytes()).await {
                error!("Failed to write response: {}", e);
            }
        }
        Err(e) => {
            error!("Failed to read from stream: {}", e);
        }
    }
}

/// Read headers, then as much body as Content-Length announces.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut data = Vec::new();
    let mut buffer = [0u8; 4096];
    loop {
        let size = stream.read(&mut buffer).await?;
        if size == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..size]);
        if data.len() > MAX_REQUEST_BYTES {
            break;
        }
        let text = String::from_utf8_lossy(&data);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let body_len = content_length(&text[..header_end]);
            if data.len() >= header_end + 4 + body_len {
                break;
            }
        }
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn request_body(request: &str) -> &str {
    request
        .find("\r\n\r\n")
        .map(|idx| &request[idx + 4..])
        .unwrap_or("")
        .trim()
}

async fn handle_request(request: &str, state: &AppState) -> String {
    let request_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", r#"{"error":"Malformed request"}"#);
    }

    let method = parts[0];
    let path = parts[1].split('?').next().unwrap_or("/");
    let path = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };
    info!("Request: {} {}", method, path);

    match (method, path) {
        ("GET", "/") => create_html_response(INDEX_HTML),
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("GET", "/api/health") => {
            let unavailable = state.service().err().map(|e| e.to_string());
            create_response(
                200,
                "OK",
                &serde_json::json!({
                    "status": "ok",
                    "service": "roaming-insights",
                    "answering": unavailable.is_none(),
                    "unavailable_reason": unavailable,
                })
                .to_string(),
            )
        }
        ("GET", "/api/tables") => match list_tables(state) {
            Ok(json) => create_response(200, "OK", &json),
            Err(e) => error_response(&e),
        },
        ("POST", "/api/ask") => {
            let question = match serde_json::from_str::<AskRequest>(request_body(request)) {
                Ok(req) => req.question,
                Err(_) => String::new(),
            };
            if question.trim().is_empty() {
                return error_response(&RoamingError::InvalidQuestion(
                    "Please enter a question".to_string(),
                ));
            }
            let service = match state.service() {
                Ok(service) => service,
                Err(e) => {
                    error!("Question answering unavailable: {}", e);
                    return error_response(&e);
                }
            };
            match service.answer(&question).await {
                Ok(answer) => match serde_json::to_string(&answer) {
                    Ok(json) => create_response(200, "OK", &json),
                    Err(e) => error_response(&RoamingError::Json(e)),
                },
                Err(e) => {
                    error!("Question failed: {}", e);
                    if let Some(turns) = e.partial_transcript() {
                        warn!("Partial transcript ({} turns):", turns.len());
                        log_turns(turns);
                    }
                    error_response(&e)
                }
            }
        }
        _ => create_response(404, "Not Found", r#"{"error":"Not found"}"#),
    }
}

fn list_tables(state: &AppState) -> Result<String, RoamingError> {
    let store = UsageStore::open_read_only(&state.config.db_path)?;
    let tables = store.list_tables()?;
    let described = store.describe_schema(&tables)?;
    let body = serde_json::json!({
        "tables": described
            .iter()
            .map(|d| serde_json::json!({ "name": d.name, "columns": d.columns }))
            .collect::<Vec<_>>(),
    });
    Ok(body.to_string())
}

fn status_for(err: &RoamingError) -> (u16, &'static str) {
    match err {
        RoamingError::InvalidQuestion(_) => (400, "Bad Request"),
        RoamingError::AgentExhausted { .. } => (422, "Unprocessable Entity"),
        RoamingError::AgentFailure { .. } | RoamingError::Llm(_) => (502, "Bad Gateway"),
        RoamingError::Database(_) => (503, "Service Unavailable"),
        _ => (500, "Internal Server Error"),
    }
}

fn error_response(err: &RoamingError) -> String {
    let (status, text) = status_for(err);
    let body = serde_json::to_string(&ErrorResponse::from_error(err))
        .unwrap_or_else(|_| r#"{"error":"Failed to serialize error"}"#.to_string());
    create_response(status, text, &body)
}

fn create_html_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body.len(),
        body
    )
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

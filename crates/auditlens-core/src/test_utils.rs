//! Test utilities for auditlens-core
//!
//! Mock Gemini and hosted-database servers for integration tests and offline
//! development. Both bind to an ephemeral port and shut down on drop.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// Canned analysis used when a test does not set its own reply
pub const DEFAULT_ANALYSIS_JSON: &str = r#"{"summary":"พบรายการผิดปกติ 1 รายการ","anomalies":[{"id":1,"actCode":"X1","monthly":"202401","amount":100000,"reason":"จำนวนเงินสูงกว่าค่าปกติมาก","severity":"High"}]}"#;

/// How the mock Gemini endpoint answers `generateContent`
#[derive(Debug, Clone)]
pub enum GeminiReply {
    /// 200 with `text` as the single candidate part
    Text(String),
    /// Non-2xx with a Google-style error body
    Error(u16, String),
    /// 200 with no candidates
    NoCandidates,
}

/// A request the mock Gemini server received
#[derive(Debug, Clone)]
pub struct RecordedGeminiRequest {
    /// Path segment after `/models/`, e.g. `gemini-2.5-flash:generateContent`
    pub target: String,
    pub api_key: Option<String>,
    pub body: Value,
}

impl RecordedGeminiRequest {
    /// Text of the first user part, i.e. the rendered prompt
    pub fn prompt(&self) -> Option<&str> {
        self.body["contents"][0]["parts"][0]["text"].as_str()
    }
}

#[derive(Default)]
struct GeminiState {
    reply: Option<GeminiReply>,
    requests: Vec<RecordedGeminiRequest>,
}

/// Mock Gemini `generateContent` server
pub struct MockGeminiServer {
    addr: SocketAddr,
    state: Arc<Mutex<GeminiState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockGeminiServer {
    /// Start the mock server replying with [`DEFAULT_ANALYSIS_JSON`]
    pub async fn start() -> Self {
        Self::start_with(GeminiReply::Text(DEFAULT_ANALYSIS_JSON.to_string())).await
    }

    pub async fn start_with(reply: GeminiReply) -> Self {
        let state = Arc::new(Mutex::new(GeminiState {
            reply: Some(reply),
            requests: Vec::new(),
        }));

        let app = Router::new()
            .route(
                "/models/:target",
                get(handle_model_info).post(handle_generate),
            )
            .with_state(Arc::clone(&state));

        let (addr, shutdown_tx) = spawn(app).await;
        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL to configure as the Gemini endpoint
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Change the reply for subsequent requests
    pub fn set_reply(&self, reply: GeminiReply) {
        self.state.lock().unwrap().reply = Some(reply);
    }

    pub fn requests(&self) -> Vec<RecordedGeminiRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockGeminiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Model metadata endpoint (health check)
async fn handle_model_info(Path(target): Path<String>) -> Json<Value> {
    Json(json!({ "name": format!("models/{}", target) }))
}

async fn handle_generate(
    State(state): State<Arc<Mutex<GeminiState>>>,
    Path(target): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let reply = {
        let mut state = state.lock().unwrap();
        state.requests.push(RecordedGeminiRequest {
            target,
            api_key: query.get("key").cloned(),
            body,
        });
        state.reply.clone()
    };

    match reply {
        Some(GeminiReply::Text(text)) => Json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        }))
        .into_response(),
        Some(GeminiReply::Error(code, message)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(json!({ "error": { "code": code, "message": message } })),
            )
                .into_response()
        }
        Some(GeminiReply::NoCandidates) | None => Json(json!({ "candidates": [] })).into_response(),
    }
}

/// A batch insert the mock database received
#[derive(Debug, Clone)]
pub struct RecordedInsert {
    pub table: String,
    pub api_key: Option<String>,
    pub authorization: Option<String>,
    pub records: Vec<Value>,
}

#[derive(Default)]
struct RestState {
    fail_from: Option<usize>,
    attempts: Vec<RecordedInsert>,
}

/// Mock hosted-database REST server (`POST /rest/v1/{table}`)
pub struct MockRestServer {
    addr: SocketAddr,
    state: Arc<Mutex<RestState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockRestServer {
    /// Start a server that accepts every insert
    pub async fn start() -> Self {
        Self::start_inner(None).await
    }

    /// Start a server whose insert `index` (0-based) and every later one fail
    pub async fn failing_from(index: usize) -> Self {
        Self::start_inner(Some(index)).await
    }

    async fn start_inner(fail_from: Option<usize>) -> Self {
        let state = Arc::new(Mutex::new(RestState {
            fail_from,
            attempts: Vec::new(),
        }));

        let app = Router::new()
            .route("/rest/v1/:table", post(handle_insert))
            .with_state(Arc::clone(&state));

        let (addr, shutdown_tx) = spawn(app).await;
        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every attempted insert, in arrival order
    pub fn inserts(&self) -> Vec<RecordedInsert> {
        self.state.lock().unwrap().attempts.clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.inserts().iter().map(|i| i.records.len()).collect()
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockRestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_insert(
    State(state): State<Arc<Mutex<RestState>>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(records): Json<Vec<Value>>,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };

    let mut state = state.lock().unwrap();
    let index = state.attempts.len();
    state.attempts.push(RecordedInsert {
        table,
        api_key: header("apikey"),
        authorization: header("authorization"),
        records,
    });

    if state.fail_from.is_some_and(|k| index >= k) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": "23505", "message": "duplicate key value violates unique constraint" })),
        )
            .into_response();
    }
    StatusCode::CREATED.into_response()
}

async fn spawn(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .unwrap();
    });

    (addr, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_rest_server_records_and_fails() {
        let server = MockRestServer::failing_from(1).await;
        let client = reqwest::Client::new();
        let url = format!("{}/rest/v1/transactions", server.url());

        let ok = client.post(&url).json(&json!([{"ba": "01"}])).send().await.unwrap();
        assert_eq!(ok.status().as_u16(), 201);
        let err = client.post(&url).json(&json!([])).send().await.unwrap();
        assert_eq!(err.status().as_u16(), 400);

        assert_eq!(server.batch_sizes(), vec![1, 0]);
        assert_eq!(server.inserts()[0].table, "transactions");
    }

    #[tokio::test]
    async fn test_mock_gemini_server_replies() {
        let server = MockGeminiServer::start_with(GeminiReply::Error(429, "quota".into())).await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/models/m:generateContent?key=k", server.url()))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 429);

        let requests = server.requests();
        assert_eq!(requests[0].target, "m:generateContent");
        assert_eq!(requests[0].api_key.as_deref(), Some("k"));
    }
}

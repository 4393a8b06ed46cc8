//! A local stand-in for the remote services ragtrace talks to:
//! OpenAI-compatible embeddings and chat, Ollama generate and guard chat,
//! a blog page, and a few endpoints with scripted failures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

pub const API_KEY: &str = "test-key";
pub const EMBED_DIMS: usize = 8;

pub const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><title>Agents</title></head>
<body>
  <nav>Posts | Archive | Search</nav>
  <h1 class="post-title">LLM Powered Autonomous Agents</h1>
  <div class="post-header">June 23, 2023</div>
  <div class="post-content">
    <p>An agent is a system that uses a large language model as its core
    controller. The agent breaks a task into subgoals, reflects on its past
    actions, and calls external tools to fetch information it lacks.</p>
    <p>Memory gives the agent a short-term context window and a long-term
    store that it can query through maximum inner product search.</p>
  </div>
  <footer>Copyright</footer>
</body>
</html>"#;

/// Deterministic embedding: vowel and common consonant counts, plus one so
/// no vector is all zeros.
pub fn embed_text(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    ['a', 'e', 'i', 'o', 'u', 't', 'n', 's']
        .iter()
        .map(|c| lower.matches(*c).count() as f32 + 1.0)
        .collect()
}

#[derive(Clone, Default)]
pub struct MockState {
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockState {
    fn hit(&self, path: &str) -> usize {
        let mut hits = self.hits.lock().unwrap();
        let n = hits.entry(path.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    /// Requests received on `path` so far.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

pub struct MockServer {
    pub base: String,
    pub state: MockState,
}

impl MockServer {
    /// Base URL for the OpenAI-compatible API.
    pub fn openai_url(&self) -> String {
        format!("{}/v1", self.base)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

pub async fn spawn_mock() -> MockServer {
    let state = MockState::default();
    let app = Router::new()
        .route("/v1/embeddings", post(embeddings))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/api/generate", post(ollama_generate))
        .route("/api/chat", post(guard_chat))
        .route("/page", get(page))
        .route("/notes.txt", get(plain_text))
        .route("/flaky", post(flaky))
        .route("/always-down", post(always_down))
        .route("/unauthorized", post(unauthorized))
        .route("/bad-request", post(bad_request))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockServer {
        base: format!("http://{}", addr),
        state,
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", API_KEY))
        .unwrap_or(false)
}

fn rejected() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": { "message": "Incorrect API key provided" } })),
    )
        .into_response()
}

async fn embeddings(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hit("/v1/embeddings");
    if !authorized(&headers) {
        return rejected();
    }
    let inputs: Vec<String> = body["input"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    // Reversed so clients must honour `index`.
    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(i, text)| json!({ "object": "embedding", "index": i, "embedding": embed_text(text) }))
        .collect();
    Json(json!({ "object": "list", "data": data, "model": body["model"] })).into_response()
}

async fn chat_completions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hit("/v1/chat/completions");
    if !authorized(&headers) {
        return rejected();
    }
    let prompt = body
        .pointer("/messages/0/content")
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    let content = format!(
        "  An agent uses an LLM as its controller. (prompt: {} chars)\n",
        prompt.chars().count()
    );
    Json(json!({
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    }))
    .into_response()
}

async fn ollama_generate(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    state.hit("/api/generate");
    let prompt = body["prompt"].as_str().unwrap_or_default();
    let response = if prompt.contains("explosives") {
        "Step one: build a bomb."
    } else {
        " A local agent answer. "
    };
    Json(json!({ "model": body["model"], "response": response, "done": true }))
}

async fn guard_chat(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    state.hit("/api/chat");
    let flagged = body["messages"]
        .as_array()
        .map(|msgs| {
            msgs.iter().any(|m| {
                m["content"]
                    .as_str()
                    .map(|c| c.to_lowercase().contains("bomb"))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);
    let verdict = if flagged { "unsafe\nS9" } else { "safe" };
    Json(json!({ "message": { "role": "assistant", "content": verdict }, "done": true }))
}

async fn page(State(state): State<MockState>) -> Response {
    state.hit("/page");
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], PAGE).into_response()
}

async fn plain_text(State(state): State<MockState>, uri: Uri) -> Response {
    state.hit(uri.path());
    (
        [(header::CONTENT_TYPE, "text/plain")],
        "  Plain notes about planning.  ",
    )
        .into_response()
}

async fn flaky(State(state): State<MockState>) -> Response {
    if state.hit("/flaky") <= 2 {
        return (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response();
    }
    Json(json!({ "ok": true })).into_response()
}

async fn always_down(State(state): State<MockState>) -> Response {
    state.hit("/always-down");
    (StatusCode::INTERNAL_SERVER_ERROR, "down").into_response()
}

async fn unauthorized(State(state): State<MockState>) -> Response {
    state.hit("/unauthorized");
    rejected()
}

async fn bad_request(State(state): State<MockState>) -> Response {
    state.hit("/bad-request");
    (StatusCode::BAD_REQUEST, "unknown parameter: tempreature").into_response()
}

//! HTTP API.
//!
//! Serves the RAG pipeline and the two chat front ends' state as JSON.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/answer` | Answer `{ "query" }`, returns the full trace |
//! | `GET`  | `/courses` | Student session: courses, threads, selection |
//! | `POST` | `/courses/{course}/threads` | Open thread `{ "title" }` |
//! | `GET`  | `/courses/{course}/threads/{thread}` | One thread with messages |
//! | `POST` | `/courses/{course}/threads/{thread}/messages` | Post `{ "content" }`, get the answer |
//! | `GET`  | `/chats` | Teacher session: chats and selection |
//! | `POST` | `/chats` | Open the next numbered chat |
//! | `GET`  | `/chats/{chat}` | One chat with messages |
//! | `POST` | `/chats/{chat}/messages` | Post `{ "content" }`, get the answer |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "unknown course: Art 300" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `upstream` (502), `internal` (500).
//!
//! Posting a message appends the user message, runs the pipeline without
//! holding the session lock, then appends the assistant reply. A suppressed
//! generation is answered with [`SUPPRESSED_REPLY`].

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ragtrace_core::pipeline::{RagPipeline, ResponseTrace};
use ragtrace_core::RagError;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::ask::build_pipeline;
use crate::config::Config;
use crate::response_log::save_response;
use crate::session::{Message, Role, SessionError, StudentSession, TeacherSession};

/// Assistant reply stored when the generation was suppressed.
pub const SUPPRESSED_REPLY: &str = "I'm sorry, but I can't help with that request.";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RagPipeline>,
    student: Arc<Mutex<StudentSession>>,
    teacher: Arc<Mutex<TeacherSession>>,
    response_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(pipeline: RagPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            student: Arc::new(Mutex::new(StudentSession::new())),
            teacher: Arc::new(Mutex::new(TeacherSession::new())),
            response_dir: None,
        }
    }

    /// Write every `/answer` trace to `<dir>/response.json`.
    pub fn with_response_log(mut self, dir: PathBuf) -> Self {
        self.response_dir = Some(dir);
        self
    }
}

/// Build the router with CORS open to all origins.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/answer", post(handle_answer))
        .route("/courses", get(handle_courses))
        .route("/courses/{course}/threads", post(handle_create_thread))
        .route("/courses/{course}/threads/{thread}", get(handle_thread))
        .route(
            "/courses/{course}/threads/{thread}/messages",
            post(handle_thread_message),
        )
        .route("/chats", get(handle_chats).post(handle_new_chat))
        .route("/chats/{chat}", get(handle_chat))
        .route("/chats/{chat}/messages", post(handle_chat_message))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until the process ends.
pub async fn serve_with(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// `ragtrace serve`: ingest the configured sources, then serve on `[server] bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let (pipeline, stats) = build_pipeline(config).await?;
    let state = AppState::new(pipeline).with_response_log(config.output.dir.clone());

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        documents = stats.documents,
        chunks = stats.chunks,
        "server listening"
    );
    println!("ragtrace listening on http://{}", config.server.bind);
    serve_with(listener, state).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// An error rendered as the JSON error contract.
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::UnknownCourse(_)
            | SessionError::UnknownThread { .. }
            | SessionError::UnknownChat(_) => {
                AppError::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
            }
            SessionError::InvalidThreadTitle | SessionError::EmptyMessage => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
            }
        }
    }
}

impl From<RagError> for AppError {
    fn from(e: RagError) -> Self {
        warn!(error = %e, "pipeline request failed");
        match e {
            RagError::Timeout { .. } => {
                AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", e.to_string())
            }
            RagError::Network { .. } | RagError::Auth { .. } | RagError::Provider { .. } => {
                AppError::new(StatusCode::BAD_GATEWAY, "upstream", e.to_string())
            }
            _ => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()),
        }
    }
}

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct AnswerRequest {
    query: String,
}

async fn handle_answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<ResponseTrace>, AppError> {
    if req.query.trim().is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "query must not be empty",
        ));
    }
    let trace = state.pipeline.answer(&req.query).await?;
    if let Some(dir) = &state.response_dir {
        if let Err(e) = save_response(&trace, dir) {
            warn!(error = %e, "failed to write response log");
        }
    }
    Ok(Json(trace))
}

/// Reply from a pipeline run.
#[derive(Serialize)]
struct Exchange {
    question: Message,
    answer: Message,
    suppressed: bool,
}

async fn answer_text(state: &AppState, content: &str) -> Result<(String, bool), AppError> {
    let trace = state.pipeline.answer(content).await?;
    Ok(match trace.response_text() {
        Some(text) => (text.to_string(), false),
        None => (SUPPRESSED_REPLY.to_string(), true),
    })
}

#[derive(Deserialize)]
struct NewThread {
    title: String,
}

#[derive(Deserialize)]
struct PostMessage {
    content: String,
}

async fn handle_courses(State(state): State<AppState>) -> Json<StudentSession> {
    Json(state.student.lock().await.clone())
}

async fn handle_create_thread(
    State(state): State<AppState>,
    Path(course): Path<String>,
    Json(req): Json<NewThread>,
) -> Result<impl IntoResponse, AppError> {
    let mut student = state.student.lock().await;
    let thread = student.create_thread(&course, &req.title)?.clone();
    Ok((StatusCode::CREATED, Json(thread)))
}

async fn handle_thread(
    State(state): State<AppState>,
    Path((course, thread)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let student = state.student.lock().await;
    Ok(Json(student.thread(&course, &thread)?.clone()))
}

async fn handle_thread_message(
    State(state): State<AppState>,
    Path((course, thread)): Path<(String, String)>,
    Json(req): Json<PostMessage>,
) -> Result<Json<Exchange>, AppError> {
    let question = state
        .student
        .lock()
        .await
        .post(&course, &thread, Role::User, &req.content)?;

    let (reply, suppressed) = answer_text(&state, &req.content).await?;

    let answer = state
        .student
        .lock()
        .await
        .post(&course, &thread, Role::Assistant, &reply)?;
    Ok(Json(Exchange {
        question,
        answer,
        suppressed,
    }))
}

async fn handle_chats(State(state): State<AppState>) -> Json<TeacherSession> {
    Json(state.teacher.lock().await.clone())
}

async fn handle_new_chat(State(state): State<AppState>) -> impl IntoResponse {
    let mut teacher = state.teacher.lock().await;
    let chat = teacher.new_chat().clone();
    (StatusCode::CREATED, Json(chat))
}

async fn handle_chat(
    State(state): State<AppState>,
    Path(chat): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let teacher = state.teacher.lock().await;
    Ok(Json(teacher.chat(&chat)?.clone()))
}

async fn handle_chat_message(
    State(state): State<AppState>,
    Path(chat): Path<String>,
    Json(req): Json<PostMessage>,
) -> Result<Json<Exchange>, AppError> {
    let question = state
        .teacher
        .lock()
        .await
        .post(&chat, Role::User, &req.content)?;

    let (reply, suppressed) = answer_text(&state, &req.content).await?;

    let answer = state
        .teacher
        .lock()
        .await
        .post(&chat, Role::Assistant, &reply)?;
    Ok(Json(Exchange {
        question,
        answer,
        suppressed,
    }))
}

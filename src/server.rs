//! JSON HTTP API for the support desk.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Liveness check (returns version) |
//! | `GET`    | `/status` | Knowledge base counts, provider reachability, agent settings |
//! | `GET`    | `/tools/list` | Tools available to the agent, with parameter schemas |
//! | `POST`   | `/chat` | Send a message; starts a session when `session_id` is omitted |
//! | `POST`   | `/upload` | Ingest a file or directory under `server.upload_root` |
//! | `POST`   | `/search` | Nearest chunks for a query |
//! | `GET`    | `/sessions/{id}/history` | Turns and tool calls of a session |
//! | `DELETE` | `/sessions/{id}` | End a session and drop its history |
//! | `POST`   | `/knowledge/reset` | Delete every document and chunk |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `parse_error` (400), `not_found` (404),
//! `store_unavailable` (503), `internal` (500).
//!
//! A chat request whose agent cycle aborted is still a `200`: the fallback
//! reply is in `reply` and `outcome` is `"aborted"`.
//!
//! # Browser access
//!
//! `/health`, `/status` and `/tools/list` answer any origin. Every other
//! route only answers the origins listed in `server.allowed_origins`.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use support_desk_core::models::SearchHit;
use support_desk_core::session::SessionEvent;
use support_desk_core::DeskError;

use crate::knowledge::BatchReport;
use crate::service::{parse_format, ChatResponse, StatusReport, SupportDesk};
use crate::tools::{ToolSet, ToolSpec};

type AppState = Arc<SupportDesk>;

/// Build the router over a shared [`SupportDesk`].
pub fn router(desk: Arc<SupportDesk>) -> Router {
    let public_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let origins: Vec<HeaderValue> = desk
        .config()
        .server
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let private_cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE]);

    let public = Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/tools/list", get(handle_list_tools))
        .layer(public_cors);

    let private = Router::new()
        .route("/chat", post(handle_chat))
        .route("/upload", post(handle_upload))
        .route("/search", post(handle_search))
        .route("/sessions/{id}/history", get(handle_history))
        .route("/sessions/{id}", delete(handle_end_session))
        .route("/knowledge/reset", post(handle_reset))
        .layer(private_cors);

    public
        .merge(private)
        .layer(TraceLayer::new_for_http())
        .with_state(desk)
}

/// Bind `bind` and serve until the process is terminated.
pub async fn run_server(desk: Arc<SupportDesk>, bind: &str) -> anyhow::Result<()> {
    let app = router(desk);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "http server listening");
    println!("Support desk listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<DeskError> for AppError {
    fn from(err: DeskError) -> Self {
        let (status, code) = match &err {
            DeskError::Parsing { .. } => (StatusCode::BAD_REQUEST, "parse_error"),
            DeskError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            DeskError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            DeskError::Configuration(_) | DeskError::ToolExecution { .. } => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            DeskError::Provider(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /status ============

#[derive(Deserialize)]
struct StatusParams {
    session_id: Option<String>,
}

async fn handle_status(
    State(desk): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Json<StatusReport> {
    Json(desk.status(params.session_id.as_deref()).await)
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolSpec>,
}

async fn handle_list_tools() -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: ToolSet::catalogue(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

async fn handle_chat(
    State(desk): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = body?;
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let session_id = req.session_id.as_deref().filter(|s| !s.trim().is_empty());
    Ok(Json(desk.chat(session_id, &req.message).await))
}

// ============ POST /upload ============

#[derive(Deserialize)]
struct UploadRequest {
    path: PathBuf,
    #[serde(default)]
    format: Option<String>,
}

async fn handle_upload(
    State(desk): State<AppState>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<BatchReport>, AppError> {
    let Json(req) = body?;
    let format = parse_format(req.format.as_deref())?;
    let path = resolve_upload_path(&desk.config().server.upload_root, &req.path)?;
    Ok(Json(desk.upload(&path, format).await?))
}

/// Resolve `requested` against `root`, following `..` and symlinks, and
/// refuse anything that lands outside `root`.
fn resolve_upload_path(root: &FsPath, requested: &FsPath) -> Result<PathBuf, AppError> {
    let root = root
        .canonicalize()
        .map_err(|_| DeskError::NotFound(format!("upload directory {}", root.display())))?;
    let candidate = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let resolved = candidate
        .canonicalize()
        .map_err(|_| DeskError::NotFound(format!("file {}", requested.display())))?;
    if !resolved.starts_with(&root) {
        tracing::warn!(path = %requested.display(), "upload outside upload_root refused");
        return Err(bad_request(format!(
            "{} is outside the upload directory",
            requested.display()
        )));
    }
    Ok(resolved)
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(desk): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = body?;
    let results = desk.search(&req.query, req.k).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ Sessions ============

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    events: Vec<SessionEvent>,
}

async fn handle_history(
    State(desk): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let events = desk.history(&id).await?;
    Ok(Json(HistoryResponse {
        session_id: id,
        events,
    }))
}

async fn handle_end_session(
    State(desk): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    desk.end_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /knowledge/reset ============

async fn handle_reset(State(desk): State<AppState>) -> Result<StatusCode, AppError> {
    desk.reset_knowledge().await?;
    Ok(StatusCode::NO_CONTENT)
}

//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/index` | Start indexing a folder (returns immediately) |
//! | `POST` | `/api/index/status` | Reconciled status for a batch of folders |
//! | `DELETE` | `/api/index` | Delete a folder's chunks and status |
//! | `POST` | `/api/search` | Reranked search, one hit per file |
//! | `POST` | `/api/auth/synology/login` | Open a NAS session |
//! | `POST` | `/api/auth/logout` | Close the caller's NAS session |
//! | `GET` | `/api/files` | List a directory |
//! | `GET` | `/api/files/download` | Stream a file |
//! | `PUT` | `/api/files` | Upload the raw request body |
//! | `DELETE` | `/api/files` | Delete a file or directory |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! The optional `X-Session-Id` header selects a NAS session; without it the
//! request acts on the local root.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "directory not found: docs" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `conflict` (409), `remote_error` (502), `internal` (500).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use folder_search_core::models::{FileItem, IndexStatus, SearchResult};

use crate::app::AppContext;
use crate::error::Error;
use crate::jobs::StartOutcome;
use crate::provider::{file_name, Provider, SynologyLogin};

pub const SESSION_HEADER: &str = "x-session-id";

const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Build the router. Exposed separately from [`run_server`] for tests.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let origins: Vec<HeaderValue> = ctx
        .config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/index",
            post(handle_start_index).delete(handle_delete_index),
        )
        .route("/api/index/status", post(handle_index_status))
        .route("/api/search", post(handle_search))
        .route("/api/auth/synology/login", post(handle_synology_login))
        .route("/api/auth/logout", post(handle_logout))
        .route(
            "/api/files",
            get(handle_list_files)
                .put(handle_upload_file)
                .delete(handle_delete_file),
        )
        .route("/api/files/download", get(handle_download_file))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(ctx)
}

/// Serve on `[server].bind` until `shutdown` resolves, then shut the
/// application context down.
pub async fn run_server<F>(ctx: Arc<AppContext>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("fsearch server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    ctx.shutdown().await;
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

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::PermissionDenied(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Error::RemoteProtocol(_) => (StatusCode::BAD_GATEWAY, "remote_error"),
            Error::Decode(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::Locked(_) => (StatusCode::CONFLICT, "conflict"),
            Error::Storage(_) | Error::Io(_) | Error::VectorIndex(_) | Error::Config(_) => {
                tracing::error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Provider for the caller. Unknown sessions are a 401.
async fn caller(ctx: &AppContext, headers: &HeaderMap) -> Result<Arc<dyn Provider>, AppError> {
    ctx.provider(session_id(headers))
        .await
        .map_err(|e| unauthorized(e.to_string()))
}

fn require(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
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

// ============ /api/index ============

#[derive(Deserialize)]
struct FolderRequest {
    folder_path: String,
}

/// `POST /api/index`. The job runs detached; poll `/api/index/status`.
async fn handle_start_index(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(req): Json<FolderRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    require(&req.folder_path, "folder_path")?;
    let provider = caller(&ctx, &headers).await?;

    let message = match ctx.start_indexing(provider, &req.folder_path).await? {
        StartOutcome::Started => format!("Indexing started for folder: {}", req.folder_path),
        StartOutcome::AlreadyRunning => {
            format!("Indexing already in progress for folder: {}", req.folder_path)
        }
    };
    Ok(Json(MessageResponse { message }))
}

#[derive(Deserialize)]
struct StatusRequest {
    folder_paths: Vec<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    statuses: HashMap<String, IndexStatus>,
}

async fn handle_index_status(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(req): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    let provider = caller(&ctx, &headers).await?;
    let statuses = ctx.statuses(provider.as_ref(), &req.folder_paths).await?;
    Ok(Json(StatusResponse { statuses }))
}

#[derive(Serialize)]
struct DeleteIndexResponse {
    message: String,
    deleted_count: usize,
}

async fn handle_delete_index(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(req): Json<FolderRequest>,
) -> Result<Json<DeleteIndexResponse>, AppError> {
    require(&req.folder_path, "folder_path")?;
    let provider = caller(&ctx, &headers).await?;

    let deleted_count = ctx
        .delete_index(provider.as_ref(), &req.folder_path)
        .await?;
    Ok(Json(DeleteIndexResponse {
        message: format!("Index deleted for folder: {}", req.folder_path),
        deleted_count,
    }))
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    n_results: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    require(&req.query, "query")?;
    let results = ctx.search(&req.query, req.n_results).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ /api/auth ============

#[derive(Serialize)]
struct LoginResponse {
    session_id: String,
    provider_id: String,
}

async fn handle_synology_login(
    State(ctx): State<Arc<AppContext>>,
    Json(login): Json<SynologyLogin>,
) -> Result<Json<LoginResponse>, AppError> {
    require(&login.host, "host")?;
    require(&login.username, "username")?;

    let session = ctx
        .sessions
        .login_synology(&login)
        .await
        .map_err(|e| match e {
            Error::PermissionDenied(msg) => unauthorized(msg),
            other => AppError::from(other),
        })?;
    Ok(Json(LoginResponse {
        session_id: session.session_id,
        provider_id: session.provider_id,
    }))
}

async fn handle_logout(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let token = session_id(&headers)
        .ok_or_else(|| bad_request("X-Session-Id header is required"))?;
    if !ctx.sessions.logout(token).await? {
        return Err(unauthorized("unknown or expired session"));
    }
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

// ============ /api/files ============

#[derive(Deserialize)]
struct PathQuery {
    #[serde(default)]
    path: String,
}

#[derive(Serialize)]
struct ListResponse {
    path: String,
    items: Vec<FileItem>,
}

async fn handle_list_files(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(q): Query<PathQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let provider = caller(&ctx, &headers).await?;
    let items = provider.list_files(&q.path).await?;
    Ok(Json(ListResponse {
        path: q.path,
        items,
    }))
}

async fn handle_download_file(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(q): Query<PathQuery>,
) -> Result<Response, AppError> {
    require(&q.path, "path")?;
    let provider = caller(&ctx, &headers).await?;
    let stream = provider.download_file(&q.path).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        file_name(&q.path).replace('"', "")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn handle_upload_file(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(q): Query<PathQuery>,
    body: Bytes,
) -> Result<Json<MessageResponse>, AppError> {
    require(&q.path, "path")?;
    let provider = caller(&ctx, &headers).await?;
    provider.upload_file(&q.path, body.to_vec()).await?;
    Ok(Json(MessageResponse {
        message: format!("Uploaded: {}", q.path),
    }))
}

async fn handle_delete_file(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(q): Query<PathQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    require(&q.path, "path")?;
    let provider = caller(&ctx, &headers).await?;
    if !provider.delete_item(&q.path).await? {
        return Err(AppError::from(Error::NotFound(q.path)));
    }
    Ok(Json(MessageResponse {
        message: format!("Deleted: {}", q.path),
    }))
}

//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/documents?filename=` | Upload raw bytes, extract, score, persist |
//! | `GET`  | `/documents` | List documents (`owner_id`, `title`, `status`, `page`, `size`) |
//! | `GET`  | `/documents/{id}` | Report: document, paragraphs, high-risk paragraphs |
//! | `DELETE` | `/documents/{id}` | Delete a document with its paragraphs and versions |
//! | `PUT`  | `/documents/{id}/paragraphs` | Batch paragraph text edits |
//! | `POST` | `/documents/{id}/recheck` | Recompute similarity from current texts |
//! | `POST` | `/rewrite` | Style-conditioned rewrite of a text |
//! | `POST` | `/documents/{id}/versions` | Save a rewrite version |
//! | `GET`  | `/documents/{id}/versions` | List versions, newest first |
//! | `GET`  | `/versions/{id}` | One version |
//! | `GET`  | `/documents/{id}/export` | Download the rebuilt `.docx` |
//!
//! The caller is identified by the `x-user-id` header (0 when absent).
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document not found: 7" } }
//! ```
//!
//! Codes: `bad_request` and `parse_error` (400), `not_found` (404),
//! `version_conflict` (409), `external_service` (502), `export_error` and
//! `internal` (500).

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::app::App;
use crate::config::Config;
use crate::error::PcError;
use crate::ingest::{DocumentReport, UploadResult};
use crate::models::{Document, NewVersion, ParagraphEdit, RewriteVersion};
use crate::rewrite::{RewriteRequest, RewriteResult};
use crate::store::DocumentFilter;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const USER_HEADER: &str = "x-user-id";

type AppState = Arc<App>;

/// Build the services from `config` and serve on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = Arc::new(App::open(config).await?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("paracheck server listening on http://{}", config.server.bind);
    serve(listener, app).await
}

/// Serve on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, app: Arc<App>) -> anyhow::Result<()> {
    axum::serve(listener, router(app)).await?;
    Ok(())
}

pub fn router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", post(handle_upload).get(handle_list))
        .route(
            "/documents/{id}",
            get(handle_report).delete(handle_delete),
        )
        .route("/documents/{id}/paragraphs", put(handle_update_paragraphs))
        .route("/documents/{id}/recheck", post(handle_recheck))
        .route(
            "/documents/{id}/versions",
            post(handle_save_version).get(handle_list_versions),
        )
        .route("/documents/{id}/export", get(handle_export))
        .route("/versions/{id}", get(handle_get_version))
        .route("/rewrite", post(handle_rewrite))
        .layer(cors)
        .with_state(app)
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
    code: String,
    message: String,
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

impl From<PcError> for AppError {
    fn from(err: PcError) -> Self {
        let status = match &err {
            PcError::Validation(_) | PcError::Parse(_) => StatusCode::BAD_REQUEST,
            PcError::NotFound { .. } => StatusCode::NOT_FOUND,
            PcError::VersionConflict { .. } => StatusCode::CONFLICT,
            PcError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            PcError::Export(_)
            | PcError::Database(_)
            | PcError::Storage(_)
            | PcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn caller_id(headers: &HeaderMap) -> Result<i64, AppError> {
    match headers.get(USER_HEADER) {
        None => Ok(0),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| bad_request(format!("{} must be an integer", USER_HEADER))),
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

// ============ Documents ============

#[derive(Deserialize)]
struct UploadParams {
    filename: Option<String>,
}

async fn handle_upload(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResult>), AppError> {
    let user_id = caller_id(&headers)?;
    let filename = params
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| bad_request("filename query parameter is required"))?;
    let result = app.documents.upload(user_id, &filename, &body).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Serialize)]
struct DocumentList {
    documents: Vec<Document>,
}

async fn handle_list(
    State(app): State<AppState>,
    Query(filter): Query<DocumentFilter>,
) -> Result<Json<DocumentList>, AppError> {
    let documents = app.documents.list(&filter).await?;
    Ok(Json(DocumentList { documents }))
}

async fn handle_report(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DocumentReport>, AppError> {
    Ok(Json(app.documents.report(id).await?))
}

async fn handle_delete(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let user_id = caller_id(&headers)?;
    app.documents.delete(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct UpdateParagraphsBody {
    paragraphs: Vec<ParagraphEdit>,
}

#[derive(Serialize)]
struct UpdateParagraphsResponse {
    updated: u64,
}

async fn handle_update_paragraphs(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateParagraphsBody>,
) -> Result<Json<UpdateParagraphsResponse>, AppError> {
    let user_id = caller_id(&headers)?;
    let updated = app
        .documents
        .update_paragraphs(user_id, id, &body.paragraphs)
        .await?;
    Ok(Json(UpdateParagraphsResponse { updated }))
}

async fn handle_recheck(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<DocumentReport>, AppError> {
    let user_id = caller_id(&headers)?;
    Ok(Json(app.documents.recheck(user_id, id).await?))
}

async fn handle_export(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let user_id = caller_id(&headers)?;
    let exported = app.documents.export(user_id, id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        exported.filename.replace('"', "")
    );
    Ok((
        [
            (header::CONTENT_TYPE, DOCX_MIME.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        exported.bytes,
    )
        .into_response())
}

// ============ Rewrite ============

async fn handle_rewrite(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RewriteRequest>,
) -> Result<Json<RewriteResult>, AppError> {
    let user_id = caller_id(&headers)?;
    Ok(Json(app.rewriter.rewrite(user_id, &request).await?))
}

// ============ Versions ============

#[derive(Deserialize)]
struct SaveVersionBody {
    #[serde(default)]
    style: Option<String>,
    content: String,
    #[serde(default)]
    remark: Option<String>,
}

async fn handle_save_version(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<SaveVersionBody>,
) -> Result<(StatusCode, Json<RewriteVersion>), AppError> {
    let user_id = caller_id(&headers)?;
    let new = NewVersion {
        document_id: id,
        style: body.style,
        content: body.content,
        remark: body.remark,
        created_by: user_id,
    };
    let version = app.save_version(&new).await?;
    Ok((StatusCode::CREATED, Json(version)))
}

#[derive(Serialize)]
struct VersionList {
    versions: Vec<RewriteVersion>,
}

async fn handle_list_versions(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<VersionList>, AppError> {
    let versions = app.versions.list_versions(id).await?;
    Ok(Json(VersionList { versions }))
}

async fn handle_get_version(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RewriteVersion>, AppError> {
    Ok(Json(app.versions.get_version(id).await?))
}

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use invoice_qa_core::InvoiceAssistant;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<InvoiceAssistant>,
    pub upload_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    filename: String,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    query: String,
    answer: String,
    source_documents: Vec<String>,
}

/// Every failure is reported as a 500 carrying the underlying message.
struct ApiError(String);

impl ApiError {
    fn upload(error: impl Display) -> Self {
        Self(format!("Failed to process invoice: {error}"))
    }

    fn query(error: impl Display) -> Self {
        Self(format!("Failed to answer query: {error}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0 })),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route(
            "/api/upload_invoice/",
            post(upload_invoice).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/query/", post(query_invoice))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, bind: SocketAddr) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&state.upload_dir).await?;
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, upload_dir = %state.upload_dir.display(), "invoice api listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Invoice Chatbot API is running.",
    })
}

async fn upload_invoice(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(ApiError::upload)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .and_then(final_component)
            .ok_or_else(|| ApiError::upload("uploaded file has no usable name"))?;
        let bytes = field.bytes().await.map_err(ApiError::upload)?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::upload("multipart field `file` is missing"))?;

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(ApiError::upload)?;
    let path = state.upload_dir.join(&filename);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(ApiError::upload)?;

    state
        .assistant
        .ingest(&path)
        .await
        .map_err(ApiError::upload)?;

    Ok(Json(UploadResponse {
        filename,
        message: "Invoice uploaded and ingested successfully.",
    }))
}

async fn query_invoice(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let answer = state
        .assistant
        .ask(&request.query)
        .await
        .map_err(ApiError::query)?;

    Ok(Json(QueryResponse {
        source_documents: answer.source_texts(),
        query: answer.query,
        answer: answer.answer,
    }))
}

// Client-supplied names may carry directories; only the last component is kept.
fn final_component(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?;
    let name = Path::new(last).file_name()?.to_str()?;
    Some(name.to_string())
}

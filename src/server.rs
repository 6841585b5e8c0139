//! HTTP surface.
//!
//! Three routes: `POST /api/upload` (multipart PDF ingestion),
//! `POST /api/chat` (streaming or buffered, negotiated by the `Accept`
//! header), and `GET /health`. Chat errors are classified by message
//! substring so the named retrieval errors keep their exact wording on
//! the wire.

use anyhow::Result;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

use crate::chat;
use crate::config::Config;
use crate::extract::MIME_PDF;
use crate::index;
use crate::session::SessionState;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const GENERIC_CHAT_ERROR: &str = "Something went wrong while answering. Please try again.";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<SessionState>,
}

/// JSON error body shared by every route.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/chat", post(chat_handler))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Binds and serves until the process is stopped.
pub async fn run_server(config: Config) -> Result<()> {
    let bind = config.server.bind.clone();
    let state = AppState {
        session: Arc::new(SessionState::new(&config.memory)),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("listening on http://{}", bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    success: bool,
    message: String,
    pages: usize,
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::new(
            StatusCode::BAD_REQUEST,
            format!("Malformed multipart request: {}", e),
        )
    })? {
        if field.name() != Some("file") {
            continue;
        }
        // The MIME gate runs before the body is read, so a rejected upload
        // never reaches ingestion.
        if !is_pdf_upload(field.content_type()) {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "Only PDF files are supported.",
            ));
        }
        let name = field.file_name().unwrap_or("upload.pdf").to_string();
        let bytes = field.bytes().await.map_err(|e| {
            AppError::new(
                StatusCode::BAD_REQUEST,
                format!("Failed to read uploaded file: {}", e),
            )
        })?;
        file = Some((name, bytes));
        break;
    }

    let Some((name, bytes)) = file else {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "No file uploaded. Send the PDF in a multipart field named \"file\".",
        ));
    };

    let index = index::ingest(&state.config, &bytes, &name)
        .await
        .map_err(|e| {
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to process PDF: {}", e),
            )
        })?;

    let pages = index.entries.len();
    state.session.set_index(Arc::new(index));

    Ok(Json(UploadResponse {
        success: true,
        message: format!("Processed \"{}\" ({} pages indexed).", name, pages),
        pages,
    }))
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    let message = body
        .get("message")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AppError::new(
                StatusCode::BAD_REQUEST,
                "Request body must include a non-empty \"message\" string.",
            )
        })?
        .to_string();

    if wants_stream(&headers) {
        let stream = chat::stream_chat_turn(&state.config, state.session.clone(), &message)
            .await
            .map_err(classify_chat_error)?;

        let ndjson = stream.map(|event| {
            let mut line = serde_json::to_string(&event).unwrap_or_else(|_| {
                r#"{"type":"error","error":"serialization failure"}"#.to_string()
            });
            line.push('\n');
            Ok::<Bytes, Infallible>(Bytes::from(line))
        });

        let response = (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(ndjson),
        )
            .into_response();
        Ok(response)
    } else {
        let response = chat::chat_turn(&state.config, state.session.clone(), &message)
            .await
            .map_err(classify_chat_error)?;
        Ok(Json(response).into_response())
    }
}

fn is_pdf_upload(content_type: Option<&str>) -> bool {
    content_type == Some(MIME_PDF)
}

fn wants_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/stream"))
        .unwrap_or(false)
}

/// Maps a chat failure to a status without leaking internals: the named
/// retrieval messages and credential errors pass through verbatim, anything
/// else becomes a generic 500.
fn classify_chat_error(err: anyhow::Error) -> AppError {
    let message = err.to_string();
    if message.contains("Vector store not found") {
        return AppError::new(StatusCode::NOT_FOUND, message);
    }
    if message.contains(crate::embedding::API_KEY_ENV) {
        return AppError::new(StatusCode::INTERNAL_SERVER_ERROR, message);
    }
    tracing::error!("chat turn failed: {:#}", err);
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_CHAT_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieve::VECTOR_STORE_NOT_FOUND;

    #[test]
    fn not_found_message_maps_to_404_verbatim() {
        let err = classify_chat_error(anyhow::anyhow!(VECTOR_STORE_NOT_FOUND));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, VECTOR_STORE_NOT_FOUND);
    }

    #[test]
    fn credential_errors_pass_through_as_500() {
        let err = classify_chat_error(anyhow::anyhow!(
            "GEMINI_API_KEY environment variable not set"
        ));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn other_errors_become_a_generic_500() {
        let err = classify_chat_error(anyhow::anyhow!("connection reset by peer"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, GENERIC_CHAT_ERROR);
    }

    #[test]
    fn only_the_pdf_mime_type_passes_the_upload_gate() {
        assert!(is_pdf_upload(Some("application/pdf")));
        assert!(!is_pdf_upload(Some("text/plain")));
        assert!(!is_pdf_upload(Some("application/octet-stream")));
        assert!(!is_pdf_upload(None));
    }

    #[test]
    fn stream_negotiation_reads_the_accept_header() {
        let mut headers = HeaderMap::new();
        assert!(!wants_stream(&headers));
        headers.insert(header::ACCEPT, "application/json".parse().unwrap());
        assert!(!wants_stream(&headers));
        headers.insert(
            header::ACCEPT,
            "text/stream, application/json".parse().unwrap(),
        );
        assert!(wants_stream(&headers));
    }
}

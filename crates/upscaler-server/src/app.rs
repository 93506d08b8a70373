//! Router, shared state and request handlers.

use std::any::Any;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use upscaler_core::Upscaler;

use crate::config::ServerConfig;
use crate::error::{ApiError, FILE_TOO_LARGE};
use crate::upload::read_image_field;
use crate::workspace::upscale_upload;

const INDEX_HTML: &str = include_str!("../static/index.html");
const SCRIPT_JS: &str = include_str!("../static/script.js");

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    upscaler: Upscaler,
    config: ServerConfig,
}

impl AppState {
    /// `upscaler` must wrap an initialized backend.
    pub fn new(upscaler: Upscaler, config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner { upscaler, config }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn upscaler(&self) -> &Upscaler {
        &self.inner.upscaler
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config().max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/static/script.js", get(script))
        .route("/health", get(health))
        .route("/process", post(process_image))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    info!("Homepage accessed");
    Html(INDEX_HTML)
}

async fn script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        SCRIPT_JS,
    )
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let upscaler = state.upscaler();
    let meta = upscaler.metadata()?;
    Ok(Json(json!({
        "status": "ok",
        "model": meta.name,
        "scale": meta.scale,
        "provider": upscaler.provider(),
    })))
}

async fn process_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    info!("Image processing request received");

    let limit = state.config().max_upload_bytes;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(ApiError::PayloadTooLarge(FILE_TOO_LARGE.into()));
    }

    let mut multipart = multipart?;
    let upload = read_image_field(&mut multipart).await?;
    info!(filename = %upload.staged_name(), "Processing file");

    let artifact = upscale_upload(
        state.upscaler(),
        state.config().scratch_root.as_deref(),
        &upload,
    )
    .await?;
    info!("Sending processed image back to client");
    Ok(artifact.into_response())
}

async fn not_found() -> ApiError {
    ApiError::Http {
        status: StatusCode::NOT_FOUND,
        message: "Not Found".into(),
    }
}

async fn method_not_allowed() -> ApiError {
    ApiError::Http {
        status: StatusCode::METHOD_NOT_ALLOWED,
        message: "Method Not Allowed".into(),
    }
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| (*s).to_string()))
        .unwrap_or_else(|| "unknown panic payload".to_string());
    error!(panic = %detail, "Handler panicked");
    ApiError::internal().into_response()
}

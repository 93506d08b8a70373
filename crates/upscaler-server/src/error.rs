//! HTTP error hierarchy.
//!
//! Every variant carries its status code and renders as `{"error": "..."}`.
//! Processing failures are logged in full and answered with a fixed message.

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use upscaler_core::UpscaleError;

pub const UNEXPECTED_ERROR: &str = "Unexpected server error";
pub const FILE_TOO_LARGE: &str = "File too large";
pub const NO_FILE_UPLOADED: &str = "No file uploaded";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    UnsupportedMedia(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Processing failed: {0}")]
    Processing(#[from] UpscaleError),

    /// Rejections raised by the framework itself (routing, malformed bodies).
    #[error("{message}")]
    Http { status: StatusCode, message: String },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http { status, .. } => *status,
        }
    }

    pub fn internal() -> Self {
        Self::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: UNEXPECTED_ERROR.into(),
        }
    }

    fn public_message(&self) -> &str {
        match self {
            Self::Validation(m) | Self::UnsupportedMedia(m) | Self::PayloadTooLarge(m) => m,
            Self::Processing(_) => UNEXPECTED_ERROR,
            Self::Http { message, .. } => message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Processing(err) => {
                error!(error = %err, code = err.error_code(), "Unexpected server error");
            }
            other => warn!(status = status.as_u16(), message = %other, "HTTP error"),
        }
        let body = Json(ErrorBody {
            error: self.public_message(),
        });
        (status, body).into_response()
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::Processing(UpscaleError::Io(err))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        match rejection {
            // Not a multipart body at all, so there is no file part to find.
            MultipartRejection::InvalidBoundary(_) => Self::Validation(NO_FILE_UPLOADED.into()),
            other => Self::Http {
                status: other.status(),
                message: other.body_text(),
            },
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge(FILE_TOO_LARGE.into()),
            status => Self::Http {
                status,
                message: err.body_text(),
            },
        }
    }
}

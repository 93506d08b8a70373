//! Typed error hierarchy shared by every upscaler crate.
//!
//! Each variant maps to a stable integer code via [`UpscaleError::error_code`]
//! so binaries can exit with a code that identifies the failure class without
//! string parsing.

use std::path::PathBuf;

/// All errors originating from model loading, inference and image I/O.
#[derive(Debug, thiserror::Error)]
pub enum UpscaleError {
    // ── Input / filesystem ───────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input image not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Image encode error: {0}")]
    Encode(String),

    // ── Inference ────────────────────────────────────────────────────
    #[error("ORT inference error: {0}")]
    Inference(#[from] ort::Error),

    #[error("Model metadata error: {0}")]
    ModelMetadata(String),

    #[error("Backend not initialized; call initialize() first")]
    NotInitialized,

    #[error("Backend already initialized")]
    AlreadyInitialized,

    #[error("Execution provider unavailable: {0}")]
    ExecutionProvider(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Blocking worker failed: {0}")]
    Worker(String),

    // ── Weights ──────────────────────────────────────────────────────
    #[error("Model weights not found at {} and no download URL is configured", .path.display())]
    WeightsMissing { path: PathBuf },

    #[error("Weights download failed: {0}")]
    WeightsDownload(String),

    #[error("Invalid weights file {}: {reason}", .path.display())]
    InvalidWeights { path: PathBuf, reason: String },

    #[error("Weights checksum mismatch: expected {expected}, got {actual}")]
    WeightsChecksum { expected: String, actual: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UpscaleError {
    /// Stable integer error code, also used as the process exit status.
    ///
    /// Codes are grouped by category and kept below 256 so they survive
    /// the truncation applied to exit statuses:
    /// - 1x: filesystem and input image
    /// - 2x: inference
    /// - 3x: model weights
    /// - 4x: configuration
    pub fn error_code(&self) -> u8 {
        match self {
            Self::Io(_) => 10,
            Self::InputNotFound(_) => 11,
            Self::Decode(_) => 12,
            Self::Encode(_) => 13,
            Self::Inference(_) => 20,
            Self::ModelMetadata(_) => 21,
            Self::NotInitialized => 22,
            Self::AlreadyInitialized => 23,
            Self::ExecutionProvider(_) => 24,
            Self::DimensionMismatch(_) => 25,
            Self::Worker(_) => 26,
            Self::WeightsMissing { .. } => 30,
            Self::WeightsDownload(_) => 31,
            Self::InvalidWeights { .. } => 32,
            Self::WeightsChecksum { .. } => 33,
            Self::Config(_) => 40,
        }
    }
}

/// Convenience alias used throughout the upscaler crates.
pub type Result<T> = std::result::Result<T, UpscaleError>;

/// Run CPU-bound work on tokio's blocking pool so async workers stay free.
pub async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| UpscaleError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::{UpscaleError, run_blocking};
    use std::path::PathBuf;

    #[test]
    fn input_not_found_names_the_path() {
        let err = UpscaleError::InputNotFound(PathBuf::from("missing/source.png"));
        assert_eq!(err.to_string(), "Input image not found: missing/source.png");
        assert_eq!(err.error_code(), 11);
    }

    #[test]
    fn error_codes_are_nonzero() {
        let samples = [
            UpscaleError::NotInitialized,
            UpscaleError::Config("bad".into()),
            UpscaleError::WeightsDownload("offline".into()),
            UpscaleError::Decode("truncated".into()),
        ];
        for err in samples {
            assert_ne!(err.error_code(), 0, "{err} must not exit with success");
        }
    }

    #[tokio::test]
    async fn blocking_work_results_and_panics_are_returned() {
        assert_eq!(run_blocking(|| Ok(7)).await.unwrap(), 7);

        let err = run_blocking(|| -> super::Result<()> { Err(UpscaleError::Encode("full disk".into())) })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), 13);

        let err = run_blocking(|| -> super::Result<()> { panic!("decoder blew up") })
            .await
            .unwrap_err();
        assert!(matches!(err, UpscaleError::Worker(_)));
        assert_eq!(err.error_code(), 26);
    }
}

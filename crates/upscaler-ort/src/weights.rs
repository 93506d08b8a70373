//! Weight store: locate, download and validate the ONNX weights file.
//!
//! The file format is checked directly instead of trusting whatever the
//! loader accepts: empty files and ZIP archives (PyTorch `.pth`
//! checkpoints) are rejected up front, and an optional SHA-256 pin must
//! match.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use upscaler_core::config::WeightsConfig;
use upscaler_core::error::{Result, UpscaleError};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Make sure the weights exist on disk and pass validation.
///
/// Downloads them first when missing and a URL is configured. Returns the
/// validated path.
pub async fn ensure_weights(cfg: &WeightsConfig) -> Result<PathBuf> {
    if !cfg.path.is_file() {
        let Some(url) = cfg.url.as_deref() else {
            return Err(UpscaleError::WeightsMissing {
                path: cfg.path.clone(),
            });
        };
        download(url, &cfg.path, cfg.sha256.as_deref()).await?;
        return Ok(cfg.path.clone());
    }

    let bytes = tokio::fs::read(&cfg.path).await?;
    validate_weights(&cfg.path, &bytes, cfg.sha256.as_deref())?;
    debug!(path = %cfg.path.display(), bytes = bytes.len(), "Weights validated");
    Ok(cfg.path.clone())
}

/// Validate weight bytes read from `path`.
pub fn validate_weights(path: &Path, bytes: &[u8], expected_sha256: Option<&str>) -> Result<()> {
    if bytes.is_empty() {
        return Err(UpscaleError::InvalidWeights {
            path: path.to_path_buf(),
            reason: "file is empty".into(),
        });
    }
    if bytes.starts_with(ZIP_MAGIC) {
        return Err(UpscaleError::InvalidWeights {
            path: path.to_path_buf(),
            reason: "ZIP archive (PyTorch checkpoint?); export the model to ONNX first".into(),
        });
    }
    if let Some(expected) = expected_sha256 {
        let actual = sha256_hex(bytes);
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(UpscaleError::WeightsChecksum {
                expected: expected.trim().to_ascii_lowercase(),
                actual,
            });
        }
    }
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fetch `url` into `dest`. The payload is validated before anything is
/// written, and only a complete, valid file is renamed into place.
async fn download(url: &str, dest: &Path, expected_sha256: Option<&str>) -> Result<()> {
    info!(url, dest = %dest.display(), "Weights missing; downloading");

    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| UpscaleError::WeightsDownload(e.to_string()))?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| UpscaleError::WeightsDownload(e.to_string()))?;
    if !response.status().is_success() {
        return Err(UpscaleError::WeightsDownload(format!(
            "HTTP {} from {url}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| UpscaleError::WeightsDownload(e.to_string()))?;
    validate_weights(dest, &bytes, expected_sha256)?;

    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Stage next to the destination so the final rename stays on one filesystem.
    let partial = dest.with_extension("part");
    if let Err(e) = stage_and_rename(&partial, dest, &bytes).await {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %partial.display(), error = %cleanup, "Failed to remove partial download");
        }
        return Err(e.into());
    }

    info!(dest = %dest.display(), bytes = bytes.len(), "Weights downloaded");
    Ok(())
}

async fn stage_and_rename(partial: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(partial, bytes).await?;
    tokio::fs::rename(partial, dest).await
}

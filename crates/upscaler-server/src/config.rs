//! Upload limits and scratch space for the HTTP endpoint.

use std::path::PathBuf;

/// Maximum accepted request body (20 MiB).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Accepted upload extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub max_upload_bytes: usize,
    /// Parent directory for per-request workspaces (`None` = system temp dir).
    pub scratch_root: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: MAX_UPLOAD_BYTES,
            scratch_root: None,
        }
    }
}

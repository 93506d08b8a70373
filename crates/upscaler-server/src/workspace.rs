//! Per-request scratch directories with guaranteed cleanup.
//!
//! A [`Workspace`] owns one freshly created directory holding the staged
//! upload and the upscaled output. It is released exactly once: either
//! after the response body has been streamed (see [`UpscaledArtifact`]),
//! or when it is dropped on an error path. Cleanup failures are logged and
//! swallowed.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::Stream;
use tempfile::TempDir;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use upscaler_core::Upscaler;

use crate::error::ApiError;
use crate::upload::Upload;

const WORKSPACE_PREFIX: &str = "upscaler-";

pub struct Workspace {
    dir: Option<TempDir>,
    input: PathBuf,
    output: PathBuf,
}

impl Workspace {
    /// Create a uniquely named directory under `root` (or the system temp
    /// dir) and derive the input/output paths inside it.
    pub fn create(root: Option<&Path>, input_name: &str) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let stem = Path::new(input_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload");
        let input = dir.path().join(input_name);
        let output = dir.path().join(format!("upscaled_{stem}.png"));
        debug!(dir = %dir.path().display(), "Workspace created");

        Ok(Self {
            dir: Some(dir),
            input,
            output,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Delete input, output and the directory. Safe to call repeatedly; only
    /// the first call does anything.
    pub fn release(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        for path in [&self.input, &self.output] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
            }
        }
        let dir_path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!(dir = %dir_path.display(), "Cleaned up temporary files"),
            Err(e) => warn!(
                dir = %dir_path.display(),
                error = %e,
                "Error cleaning up temporary files"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stage an upload, upscale it and return the output ready to stream.
///
/// Any failure drops the workspace before the error propagates, so the
/// directory is gone by the time the error response is built.
pub async fn upscale_upload(
    upscaler: &Upscaler,
    scratch_root: Option<&Path>,
    upload: &Upload,
) -> Result<UpscaledArtifact, ApiError> {
    let workspace = Workspace::create(scratch_root, &upload.staged_name())?;

    tokio::fs::write(workspace.input(), &upload.bytes).await?;
    info!(path = %workspace.input().display(), "File saved to temporary directory");

    upscaler
        .upscale_file(workspace.input(), workspace.output())
        .await?;

    let file = File::open(workspace.output()).await?;
    let len = file.metadata().await?.len();
    Ok(UpscaledArtifact {
        file,
        len,
        workspace,
    })
}

/// Upscaled PNG on disk plus the workspace that must outlive its streaming.
pub struct UpscaledArtifact {
    file: File,
    len: u64,
    workspace: Workspace,
}

impl UpscaledArtifact {
    pub fn filename(&self) -> String {
        self.workspace
            .output()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upscaled.png".to_string())
    }
}

impl IntoResponse for UpscaledArtifact {
    fn into_response(self) -> Response {
        let disposition = format!("inline; filename=\"{}\"", self.filename());
        let len = self.len;
        let stream = ArtifactStream {
            inner: Some(ReaderStream::new(self.file)),
            workspace: self.workspace,
        };
        (
            [
                (header::CONTENT_TYPE, "image/png".to_string()),
                (header::CONTENT_LENGTH, len.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            Body::from_stream(stream),
        )
            .into_response()
    }
}

/// File stream that releases its workspace once the last chunk is read or
/// the body is dropped, whichever comes first.
struct ArtifactStream {
    inner: Option<ReaderStream<File>>,
    workspace: Workspace,
}

impl Stream for ArtifactStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(inner).poll_next(cx) {
            Poll::Ready(None) => {
                // Close the file before deleting it.
                self.inner = None;
                self.workspace.release();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

//! Super-resolution inference contract.

use async_trait::async_trait;
use image::RgbImage;

use crate::error::Result;

/// Metadata extracted from the model's input/output tensor descriptors.
#[derive(Clone, Debug)]
pub struct ModelMetadata {
    /// Model identifier string from the graph metadata.
    pub name: String,
    /// Spatial upscale factor (`4` for the Real-ESRGAN x4 weights).
    pub scale: u32,
    /// Name of the model's input tensor node.
    pub input_name: String,
    /// Name of the model's output tensor node.
    pub output_name: String,
    /// Number of input channels (`3` for RGB planar).
    pub input_channels: u32,
}

/// Super-resolution inference backend.
///
/// Lifecycle is explicit: construct, [`initialize`](Self::initialize) once,
/// call [`process`](Self::process) any number of times, then optionally
/// [`shutdown`](Self::shutdown). Implementations serialize inference
/// internally; callers may share one instance behind an `Arc`.
#[async_trait]
pub trait UpscaleBackend: Send + Sync {
    /// Load the weights, build the session and capture model metadata.
    async fn initialize(&self) -> Result<()>;
    /// Run a single raw inference pass over an RGB image.
    async fn process(&self, input: RgbImage) -> Result<RgbImage>;
    /// Release the session and report final metrics.
    async fn shutdown(&self) -> Result<()>;
    /// Return the model metadata captured during [`initialize`](Self::initialize).
    fn metadata(&self) -> Result<&ModelMetadata>;
    /// Name of the execution provider chosen during initialization, if any.
    fn provider(&self) -> Option<&str> {
        None
    }
}

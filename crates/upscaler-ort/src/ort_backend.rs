//! ONNX Runtime backend: Real-ESRGAN session with CUDA to CPU fallback.
//!
//! # Execution provider policy
//!
//! [`ExecutionMode::Auto`] registers the CUDA execution provider with
//! `error_on_failure`; if registration fails the session is rebuilt on the
//! CPU provider and the fallback is logged. The chosen provider is fixed
//! for the lifetime of the backend.
//!
//! # Concurrency
//!
//! `Session::run` needs exclusive access and is CPU/GPU bound. Each pass is
//! moved to tokio's blocking pool and takes the session's lock there, so at
//! most one pass runs at a time and async workers never wait on inference.
//! The backend is single-use: once shut down it cannot be initialized again.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use image::RgbImage;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{Tensor, ValueType};

use upscaler_core::backend::{ModelMetadata, UpscaleBackend};
use upscaler_core::config::{ExecutionMode, ModelConfig};
use upscaler_core::error::{Result, UpscaleError, run_blocking};

use crate::tensor::{nchw_to_rgb, rgb_to_nchw};
use crate::weights::ensure_weights;

const CUDA_PROVIDER: &str = "CUDAExecutionProvider";
const CPU_PROVIDER: &str = "CPUExecutionProvider";

// ─── Inference metrics ───────────────────────────────────────────────────────

/// Atomic counters for inference observability.
#[derive(Debug)]
pub struct InferenceMetrics {
    /// Total inference passes (one per tile).
    pub passes: AtomicU64,
    /// Cumulative inference time in microseconds.
    pub total_inference_us: AtomicU64,
    /// Peak single-pass inference time in microseconds.
    pub peak_inference_us: AtomicU64,
}

impl InferenceMetrics {
    pub const fn new() -> Self {
        Self {
            passes: AtomicU64::new(0),
            total_inference_us: AtomicU64::new(0),
            peak_inference_us: AtomicU64::new(0),
        }
    }

    pub fn record(&self, elapsed_us: u64) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.total_inference_us
            .fetch_add(elapsed_us, Ordering::Relaxed);
        self.peak_inference_us
            .fetch_max(elapsed_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> InferenceMetricsSnapshot {
        let passes = self.passes.load(Ordering::Relaxed);
        let total = self.total_inference_us.load(Ordering::Relaxed);
        InferenceMetricsSnapshot {
            passes,
            avg_inference_us: if passes > 0 { total / passes } else { 0 },
            peak_inference_us: self.peak_inference_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for InferenceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of inference metrics for reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferenceMetricsSnapshot {
    pub passes: u64,
    pub avg_inference_us: u64,
    pub peak_inference_us: u64,
}

// ─── Backend ─────────────────────────────────────────────────────────────────

struct InferenceState {
    session: Arc<std::sync::Mutex<Session>>,
}

pub struct OrtBackend {
    config: ModelConfig,
    meta: OnceLock<ModelMetadata>,
    selected_provider: OnceLock<String>,
    state: Mutex<Option<InferenceState>>,
    pub inference_metrics: InferenceMetrics,
}

impl OrtBackend {
    /// Create an uninitialized backend. Nothing is loaded until
    /// [`UpscaleBackend::initialize`] runs.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            meta: OnceLock::new(),
            selected_provider: OnceLock::new(),
            state: Mutex::new(None),
            inference_metrics: InferenceMetrics::new(),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn build_session(&self, weights: &Path, cuda: bool) -> Result<Session> {
        let mut builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
        if let Some(threads) = self.config.intra_threads {
            builder = builder.with_intra_threads(threads)?;
        }
        let builder = if cuda {
            builder.with_execution_providers([CUDAExecutionProvider::default()
                .build()
                .error_on_failure()])?
        } else {
            builder.with_execution_providers([CPUExecutionProvider::default().build()])?
        };
        Ok(builder.commit_from_file(weights)?)
    }

    fn extract_metadata(session: &Session, configured_scale: u32) -> Result<ModelMetadata> {
        let (Some(input), Some(output)) = (session.inputs.first(), session.outputs.first()) else {
            return Err(UpscaleError::ModelMetadata(
                "Model must have at least one input and one output tensor".into(),
            ));
        };

        let input_dims: Vec<i64> = match &input.input_type {
            ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
            other => {
                return Err(UpscaleError::ModelMetadata(format!(
                    "Expected tensor input, got {other:?}"
                )));
            }
        };
        let output_dims: Vec<i64> = match &output.output_type {
            ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
            other => {
                return Err(UpscaleError::ModelMetadata(format!(
                    "Expected tensor output, got {other:?}"
                )));
            }
        };

        if input_dims.len() != 4 || output_dims.len() != 4 {
            return Err(UpscaleError::ModelMetadata(format!(
                "Expected 4D tensors (NCHW), got input={}D output={}D",
                input_dims.len(),
                output_dims.len()
            )));
        }

        let input_channels = match input_dims[1] {
            c if c > 0 => c as u32,
            _ => 3,
        };
        if input_channels != 3 {
            return Err(UpscaleError::ModelMetadata(format!(
                "Expected an RGB model, input has {input_channels} channels"
            )));
        }

        let scale = Self::resolve_scale(&input_dims, &output_dims, configured_scale)?;

        let name = session
            .metadata()
            .and_then(|m| m.name())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(ModelMetadata {
            name,
            scale,
            input_name: input.name.clone(),
            output_name: output.name.clone(),
            input_channels,
        })
    }

    /// Scale implied by static spatial axes, or the configured scale when the
    /// axes are dynamic.
    fn resolve_scale(input_dims: &[i64], output_dims: &[i64], configured: u32) -> Result<u32> {
        let (ih, iw, oh, ow) = (input_dims[2], input_dims[3], output_dims[2], output_dims[3]);
        if ih <= 0 || iw <= 0 || oh <= 0 || ow <= 0 {
            debug!(configured, "Dynamic spatial axes; using configured scale");
            return Ok(configured);
        }
        if oh % ih != 0 || ow % iw != 0 || oh / ih != ow / iw {
            return Err(UpscaleError::ModelMetadata(format!(
                "Non-integer or anisotropic scale: {ih}x{iw} -> {oh}x{ow}"
            )));
        }
        let scale = (oh / ih) as u32;
        if scale != configured {
            return Err(UpscaleError::ModelMetadata(format!(
                "Model scale {scale} does not match configured scale {configured}"
            )));
        }
        Ok(scale)
    }
}

/// One synchronous inference pass. Returns the output and the time spent in
/// `Session::run`, in microseconds.
fn run_pass(
    session: &std::sync::Mutex<Session>,
    input: &RgbImage,
    scale: u32,
) -> Result<(RgbImage, u64)> {
    let mut session = session
        .lock()
        .map_err(|_| UpscaleError::Worker("ORT session lock poisoned".into()))?;

    let (w, h) = input.dimensions();
    let input_tensor =
        Tensor::from_array(([1usize, 3, h as usize, w as usize], rgb_to_nchw(input)))?;

    let t_start = Instant::now();
    let outputs = session.run(ort::inputs![input_tensor])?;
    let elapsed_us = t_start.elapsed().as_micros() as u64;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    if shape.len() != 4 || shape[0] != 1 || shape[1] != 3 {
        return Err(UpscaleError::ModelMetadata(format!(
            "Expected output shape [1, 3, H, W], got {:?}",
            &shape[..]
        )));
    }
    let (out_h, out_w) = (shape[2] as u32, shape[3] as u32);
    if (out_w, out_h) != (w * scale, h * scale) {
        return Err(UpscaleError::DimensionMismatch(format!(
            "{w}x{h} input produced {out_w}x{out_h}, expected scale {scale}"
        )));
    }
    let upscaled = nchw_to_rgb(data, out_w, out_h)?;
    debug!(w, h, out_w, out_h, elapsed_us, "Inference complete");
    Ok((upscaled, elapsed_us))
}

#[async_trait]
impl UpscaleBackend for OrtBackend {
    async fn initialize(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        if guard.is_some() || self.meta.get().is_some() {
            return Err(UpscaleError::AlreadyInitialized);
        }

        let weights = ensure_weights(&self.config.weights).await?;
        let mode = self.config.execution;
        info!(
            path = %weights.display(),
            %mode,
            "Loading ONNX model with ORT execution provider policy"
        );

        let (session, active_provider) = match mode {
            ExecutionMode::Cpu => (self.build_session(&weights, false)?, CPU_PROVIDER),
            ExecutionMode::Cuda => match self.build_session(&weights, true) {
                Ok(session) => (session, CUDA_PROVIDER),
                Err(e) => return Err(UpscaleError::ExecutionProvider(e.to_string())),
            },
            ExecutionMode::Auto => match self.build_session(&weights, true) {
                Ok(session) => (session, CUDA_PROVIDER),
                Err(e) => {
                    warn!(
                        error = %e,
                        "CUDA EP registration failed; falling back to CPUExecutionProvider"
                    );
                    (self.build_session(&weights, false)?, CPU_PROVIDER)
                }
            },
        };
        info!(provider = active_provider, "ORT execution provider selected");

        let metadata = Self::extract_metadata(&session, self.config.scale)?;
        info!(
            name = %metadata.name,
            scale = metadata.scale,
            input = %metadata.input_name,
            output = %metadata.output_name,
            provider = active_provider,
            "Model loaded"
        );

        // Both cells are empty here: the state lock is held and `meta` was checked above.
        self.meta
            .set(metadata)
            .map_err(|_| UpscaleError::AlreadyInitialized)?;
        self.selected_provider
            .set(active_provider.to_string())
            .map_err(|_| UpscaleError::AlreadyInitialized)?;
        *guard = Some(InferenceState {
            session: Arc::new(std::sync::Mutex::new(session)),
        });
        Ok(())
    }

    async fn process(&self, input: RgbImage) -> Result<RgbImage> {
        let scale = self.metadata()?.scale;
        let session = {
            let guard = self.state.lock().await;
            let state = guard.as_ref().ok_or(UpscaleError::NotInitialized)?;
            Arc::clone(&state.session)
        };

        let (upscaled, elapsed_us) =
            run_blocking(move || run_pass(&session, &input, scale)).await?;
        self.inference_metrics.record(elapsed_us);
        Ok(upscaled)
    }

    async fn shutdown(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        if let Some(state) = guard.take() {
            let snap = self.inference_metrics.snapshot();
            info!(
                passes = snap.passes,
                avg_us = snap.avg_inference_us,
                peak_us = snap.peak_inference_us,
                provider = self.provider().unwrap_or("none"),
                "Final inference metrics"
            );
            // A pass still running on the blocking pool keeps its own handle.
            drop(state);
            debug!("ORT backend shutdown complete");
        }
        Ok(())
    }

    fn metadata(&self) -> Result<&ModelMetadata> {
        self.meta.get().ok_or(UpscaleError::NotInitialized)
    }

    fn provider(&self) -> Option<&str> {
        self.selected_provider.get().map(String::as_str)
    }
}

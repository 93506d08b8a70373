//! Model and runtime configuration.
//!
//! Defaults carry the fixed values the service ships with; the binaries
//! override them from command-line flags and `UPSCALER_*` environment
//! variables.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::UpscaleError;
use crate::tiling::TileConfig;

/// Default on-disk location of the Real-ESRGAN x4 ONNX weights.
pub const DEFAULT_WEIGHTS_PATH: &str = "weights/RealESRGAN_x4.onnx";

/// Upscale factor of the bundled model.
pub const DEFAULT_SCALE: u32 = 4;

/// Where the weights live and how to obtain and verify them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightsConfig {
    pub path: PathBuf,
    /// Fetched when `path` does not exist.
    pub url: Option<String>,
    /// Expected lowercase hex SHA-256 of the weights file.
    pub sha256: Option<String>,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_WEIGHTS_PATH),
            url: None,
            sha256: None,
        }
    }
}

/// Execution provider policy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Try CUDA, fall back to CPU.
    #[default]
    Auto,
    /// CUDA or fail.
    Cuda,
    /// CPU only.
    Cpu,
}

impl FromStr for ExecutionMode {
    type Err = UpscaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "cpu" => Ok(Self::Cpu),
            other => Err(UpscaleError::Config(format!(
                "Unknown execution mode '{other}'. Use auto, cuda or cpu."
            ))),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        })
    }
}

/// Everything needed to construct and initialize a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelConfig {
    pub weights: WeightsConfig,
    pub scale: u32,
    pub execution: ExecutionMode,
    /// Intra-op thread count for the CPU provider (`None` = runtime default).
    pub intra_threads: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: WeightsConfig::default(),
            scale: DEFAULT_SCALE,
            execution: ExecutionMode::default(),
            intra_threads: None,
        }
    }
}

/// Resolved configuration for one upscaler instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpscalerConfig {
    pub model: ModelConfig,
    pub tiling: TileConfig,
}

/// Command-line arguments shared by the CLI and the server binaries.
#[cfg(feature = "clap")]
#[derive(clap::Args, Debug, Clone)]
pub struct ModelArgs {
    /// Path to the ONNX weights file.
    #[arg(long = "weights", env = "UPSCALER_WEIGHTS", default_value = DEFAULT_WEIGHTS_PATH)]
    pub weights: PathBuf,

    /// URL to download the weights from when the file is missing.
    #[arg(long = "weights-url", env = "UPSCALER_WEIGHTS_URL")]
    pub weights_url: Option<String>,

    /// Expected SHA-256 (hex) of the weights file.
    #[arg(long = "weights-sha256", env = "UPSCALER_WEIGHTS_SHA256")]
    pub weights_sha256: Option<String>,

    /// Execution provider policy: auto, cuda or cpu.
    #[arg(long = "execution", env = "UPSCALER_EXECUTION", default_value_t = ExecutionMode::Auto)]
    pub execution: ExecutionMode,

    /// Intra-op threads for CPU inference.
    #[arg(long = "threads", env = "UPSCALER_THREADS")]
    pub threads: Option<usize>,

    /// Tile edge length in input pixels.
    #[arg(long = "tile", env = "UPSCALER_TILE", default_value_t = 192)]
    pub tile: u32,

    /// Overlap added around each tile.
    #[arg(long = "tile-pad", env = "UPSCALER_TILE_PAD", default_value_t = 24)]
    pub tile_pad: u32,

    /// Run the whole image through the model in one pass.
    #[arg(long = "no-tiling")]
    pub no_tiling: bool,
}

#[cfg(feature = "clap")]
impl ModelArgs {
    pub fn into_config(self) -> UpscalerConfig {
        UpscalerConfig {
            model: ModelConfig {
                weights: WeightsConfig {
                    path: self.weights,
                    url: self.weights_url,
                    sha256: self.weights_sha256.map(|s| s.to_ascii_lowercase()),
                },
                scale: DEFAULT_SCALE,
                execution: self.execution,
                intra_threads: self.threads,
            },
            tiling: TileConfig {
                enabled: !self.no_tiling,
                tile: self.tile,
                pad: self.tile_pad,
            },
        }
    }
}

#![doc = include_str!("../README.md")]

pub mod backend;
pub mod config;
pub mod error;
pub mod tiling;
pub mod upscaler;

pub use backend::{ModelMetadata, UpscaleBackend};
pub use config::{ExecutionMode, ModelConfig, UpscalerConfig, WeightsConfig};
pub use error::{Result, UpscaleError, run_blocking};
pub use tiling::TileConfig;
pub use upscaler::Upscaler;

#[cfg(feature = "clap")]
pub use config::ModelArgs;

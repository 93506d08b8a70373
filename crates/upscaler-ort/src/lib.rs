#![doc = include_str!("../README.md")]

pub mod ort_backend;
pub mod tensor;
pub mod weights;

pub use ort_backend::{InferenceMetrics, InferenceMetricsSnapshot, OrtBackend};
pub use weights::ensure_weights;

#![doc = include_str!("../README.md")]

pub mod app;
pub mod config;
pub mod error;
pub mod upload;
pub mod workspace;

pub use app::{AppState, router};
pub use config::ServerConfig;
pub use error::ApiError;

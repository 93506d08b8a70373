//! HTTP server entrypoint.
//!
//! ```bash
//! upscaler-server --bind 127.0.0.1:5000
//! upscaler-server --dev --execution cpu --weights weights/RealESRGAN_x4.onnx
//! ```

use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use upscaler_core::{ModelArgs, UpscaleBackend, UpscaleError, Upscaler};
use upscaler_ort::OrtBackend;
use upscaler_server::{AppState, ServerConfig, router};

#[derive(Parser, Debug)]
#[command(name = "upscaler-server", version, about = "Serve 4x image upscaling over HTTP")]
struct Cli {
    /// Address to listen on.
    #[arg(long = "bind", env = "UPSCALER_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,

    /// Directory for per-request workspaces (default: system temp dir).
    #[arg(long = "scratch-dir", env = "UPSCALER_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Local development mode: debug-level logging.
    #[arg(long = "dev")]
    dev: bool,

    #[command(flatten)]
    model: ModelArgs,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.dev);

    let rt = build_runtime();
    match rt.block_on(serve(cli)) {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            tracing::error!(error = %err, code = err.error_code(), "Server failed");
            std::process::exit(i32::from(err.error_code()));
        }
    }
}

fn init_tracing(dev: bool) {
    let ansi_enabled = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    let default_level = if dev { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(ansi_enabled)
        .init();
}

fn build_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime")
}

async fn serve(cli: Cli) -> Result<(), UpscaleError> {
    let config = cli.model.into_config();

    // The model is loaded once, before the listener accepts anything.
    let backend = Arc::new(OrtBackend::new(config.model));
    backend.initialize().await?;
    let upscaler = Upscaler::new(backend.clone(), config.tiling);

    let state = AppState::new(
        upscaler,
        ServerConfig {
            scratch_root: cli.scratch_dir,
            ..ServerConfig::default()
        },
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    info!(addr = %listener.local_addr()?, dev = cli.dev, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    backend.shutdown().await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

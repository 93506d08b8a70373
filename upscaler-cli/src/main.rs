//! `upscaler`: upscale one image file 4x.
//!
//! ```bash
//! upscaler                                  # source.png -> output.png
//! upscaler photo.jpg photo_x4.png
//! upscaler photo.jpg out.png --execution cpu --no-tiling
//! ```
//!
//! The process exits with [`UpscaleError::error_code`] on failure.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use upscaler_core::{ModelArgs, Result, UpscaleBackend, UpscaleError, Upscaler};
use upscaler_ort::OrtBackend;

#[derive(Parser, Debug)]
#[command(name = "upscaler", version, about = "Upscale an image 4x with Real-ESRGAN")]
struct Cli {
    /// Input image path.
    #[arg(default_value = "source.png")]
    input: PathBuf,

    /// Output PNG path.
    #[arg(default_value = "output.png")]
    output: PathBuf,

    #[command(flatten)]
    model: ModelArgs,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let rt = build_runtime();
    match rt.block_on(run(cli)) {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            tracing::error!(error = %err, code = err.error_code(), "Upscale failed");
            std::process::exit(i32::from(err.error_code()));
        }
    }
}

fn init_tracing() {
    let ansi_enabled = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
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

async fn run(cli: Cli) -> Result<()> {
    // Fail before paying for weight download and session creation.
    if !cli.input.is_file() {
        return Err(UpscaleError::InputNotFound(cli.input));
    }

    let config = cli.model.into_config();
    let backend = Arc::new(OrtBackend::new(config.model));
    backend.initialize().await?;

    let upscaler = Upscaler::new(backend.clone(), config.tiling);
    let result = upscaler.upscale_file(&cli.input, &cli.output).await;
    backend.shutdown().await?;

    let saved = result?;
    info!(path = %saved.display(), "Upscaled image saved");
    println!("Upscaled image saved to {}", saved.display());
    Ok(())
}

//! Inference adapter: decode → (tile →) infer → stitch → encode.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, imageops};
use tracing::{debug, info};

use crate::backend::{ModelMetadata, UpscaleBackend};
use crate::error::{Result, UpscaleError, run_blocking};
use crate::tiling::{TileConfig, plan_tiles};

/// Shared, cheaply cloneable front end over an initialized backend.
#[derive(Clone)]
pub struct Upscaler {
    backend: Arc<dyn UpscaleBackend>,
    tiling: TileConfig,
}

impl Upscaler {
    /// Wrap a backend. The backend must be initialized before the first
    /// upscale call, otherwise that call fails with
    /// [`UpscaleError::NotInitialized`].
    pub fn new(backend: Arc<dyn UpscaleBackend>, tiling: TileConfig) -> Self {
        Self { backend, tiling }
    }

    pub fn metadata(&self) -> Result<&ModelMetadata> {
        self.backend.metadata()
    }

    pub fn provider(&self) -> Option<&str> {
        self.backend.provider()
    }

    pub fn tiling(&self) -> &TileConfig {
        &self.tiling
    }

    /// Upscale an in-memory image by the model's scale factor.
    ///
    /// Alpha is discarded and grayscale is expanded to RGB before inference.
    pub async fn upscale_image(&self, image: &DynamicImage) -> Result<RgbImage> {
        let rgb = image.to_rgb8();
        let scale = self.backend.metadata()?.scale;
        let (w, h) = rgb.dimensions();
        if w == 0 || h == 0 {
            return Err(UpscaleError::DimensionMismatch(format!(
                "cannot upscale an empty {w}x{h} image"
            )));
        }

        if !self.tiling.should_tile(w, h) {
            let out = self.backend.process(rgb).await?;
            check_output(&out, w, h, scale)?;
            return Ok(out);
        }

        let tiles = plan_tiles(w, h, &self.tiling);
        debug!(
            w,
            h,
            tiles = tiles.len(),
            tile = self.tiling.tile,
            pad = self.tiling.pad,
            "Tiled inference"
        );

        let mut canvas = RgbImage::new(w * scale, h * scale);
        for tile in &tiles {
            let p = tile.padded;
            let patch = imageops::crop_imm(&rgb, p.x, p.y, p.width, p.height).to_image();
            let out = self.backend.process(patch).await?;
            check_output(&out, p.width, p.height, scale)?;

            let (ox, oy) = tile.core_offset();
            let core = imageops::crop_imm(
                &out,
                ox * scale,
                oy * scale,
                tile.core.width * scale,
                tile.core.height * scale,
            )
            .to_image();
            imageops::replace(
                &mut canvas,
                &core,
                i64::from(tile.core.x * scale),
                i64::from(tile.core.y * scale),
            );
        }
        Ok(canvas)
    }

    /// Upscale the image at `input` and write a PNG to `output`.
    ///
    /// The output is always PNG-encoded regardless of its extension; missing
    /// parent directories are created.
    pub async fn upscale_file(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        let image = {
            let input = input.to_path_buf();
            run_blocking(move || decode(&input)).await?
        };
        info!(
            input = %input.display(),
            width = image.width(),
            height = image.height(),
            "Starting image upscaling"
        );

        let upscaled = self.upscale_image(&image).await?;
        let (out_w, out_h) = upscaled.dimensions();

        let target = output.to_path_buf();
        run_blocking(move || encode_png(&upscaled, &target)).await?;

        info!(
            output = %output.display(),
            width = out_w,
            height = out_h,
            "Image upscaling completed"
        );
        Ok(output.to_path_buf())
    }
}

/// Decode an image, sniffing the format from content rather than trusting
/// the extension.
pub fn decode(path: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => UpscaleError::InputNotFound(path.to_path_buf()),
        _ => UpscaleError::Io(e),
    })?;
    reader
        .with_guessed_format()?
        .decode()
        .map_err(|e| UpscaleError::Decode(format!("{}: {e}", path.display())))
}

/// Write `image` as PNG, creating missing parent directories.
fn encode_png(image: &RgbImage, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    image
        .save_with_format(output, ImageFormat::Png)
        .map_err(|e| UpscaleError::Encode(e.to_string()))
}

fn check_output(out: &RgbImage, in_w: u32, in_h: u32, scale: u32) -> Result<()> {
    let expected = (in_w * scale, in_h * scale);
    if out.dimensions() != expected {
        return Err(UpscaleError::DimensionMismatch(format!(
            "backend returned {}x{} for a {in_w}x{in_h} input, expected {}x{}",
            out.width(),
            out.height(),
            expected.0,
            expected.1
        )));
    }
    Ok(())
}

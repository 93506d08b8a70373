//! RGB8 ⇄ planar NCHW `f32` conversion for the Real-ESRGAN graph.
//!
//! The model consumes and produces `[1, 3, H, W]` tensors with values in
//! `[0, 1]`, channel order RGB.

use image::RgbImage;

use upscaler_core::error::{Result, UpscaleError};

/// Pack an RGB image into a planar `[1, 3, H, W]` buffer normalized to `[0, 1]`.
pub fn rgb_to_nchw(image: &RgbImage) -> Vec<f32> {
    let (w, h) = image.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, px) in image.pixels().enumerate() {
        data[i] = f32::from(px[0]) / 255.0;
        data[plane + i] = f32::from(px[1]) / 255.0;
        data[2 * plane + i] = f32::from(px[2]) / 255.0;
    }
    data
}

/// Unpack a planar `[1, 3, H, W]` buffer into an RGB image, clamping to `[0, 1]`.
pub fn nchw_to_rgb(data: &[f32], width: u32, height: u32) -> Result<RgbImage> {
    let plane = (width as usize) * (height as usize);
    if data.len() != 3 * plane {
        return Err(UpscaleError::DimensionMismatch(format!(
            "output tensor holds {} values, expected 3x{width}x{height}",
            data.len()
        )));
    }

    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let mut out = RgbImage::new(width, height);
    for (i, px) in out.pixels_mut().enumerate() {
        px.0 = [
            to_u8(data[i]),
            to_u8(data[plane + i]),
            to_u8(data[2 * plane + i]),
        ];
    }
    Ok(out)
}

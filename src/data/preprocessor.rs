// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns an encoded image file into model input.
//
// Two stages, split so decoded pixels can be cached as u8
// (4x smaller than f32) and only expanded when batching:
//
//   load()       file → RGB, resized to S×S, HWC u8
//   normalize()  HWC u8 → CHW f32 in [0, 1]
//
// Resizing uses bilinear (triangle) filtering and stretches
// the image; the aspect ratio is not preserved.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use std::path::Path;

/// Number of colour channels fed to the backbone
pub const CHANNELS: usize = 3;

/// Divisor mapping u8 pixels into [0, 1]
pub const PIXEL_SCALE: f32 = 255.0;

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    image_size: usize,
}

impl Preprocessor {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Number of values in one preprocessed image
    pub fn pixel_count(&self) -> usize {
        CHANNELS * self.image_size * self.image_size
    }

    /// Decode, convert to RGB and resize. Returns HWC bytes.
    pub fn load(&self, path: &Path) -> Result<Vec<u8>> {
        let img = image::open(path)
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?
            .to_rgb8();

        let side = self.image_size as u32;
        let resized = if img.dimensions() == (side, side) {
            img
        } else {
            imageops::resize(&img, side, side, FilterType::Triangle)
        };
        Ok(resized.into_raw())
    }

    /// Scale to [0, 1] and reorder HWC → CHW.
    pub fn normalize(&self, pixels: &[u8]) -> Vec<f32> {
        let plane = self.image_size * self.image_size;
        let mut out = vec![0.0f32; CHANNELS * plane];
        for (i, rgb) in pixels.chunks_exact(CHANNELS).enumerate() {
            for (c, &v) in rgb.iter().enumerate() {
                out[c * plane + i] = v as f32 / PIXEL_SCALE;
            }
        }
        out
    }
}

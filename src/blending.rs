//! Alpha blending math for watermark removal.
//!
//! The watermark is composited via forward alpha blending with a white logo:
//! `watermarked = alpha * 255 + (1 - alpha) * original`
//!
//! This module provides the reverse operation to recover original pixels.

use image::{ImageResult, RgbaImage};

/// Alpha threshold: ignore pixels with negligible watermark effect (noise).
pub const ALPHA_THRESHOLD: f32 = 0.002;

/// Maximum alpha: clamp to avoid division by near-zero in reverse blending.
pub const MAX_ALPHA: f32 = 0.99;

/// Channel value of the overlaid logo (white).
pub const LOGO_VALUE: f32 = 255.0;

/// Calculate an alpha map from an encoded reference asset.
///
/// The asset is the watermark rendered opaque onto black, so the opacity at each
/// pixel is `alpha = max(R, G, B) / 255.0`. The asset's own alpha channel is ignored.
///
/// Returns a flat row-major `Vec<f32>` of length `width * height`, plus the `(width, height)`.
///
/// # Errors
///
/// Returns the decoder's error if the bytes are not a decodable image.
pub fn calculate_alpha_map(asset_bytes: &[u8]) -> ImageResult<(Vec<f32>, u32, u32)> {
    let img = image::load_from_memory(asset_bytes)?.to_rgb8();

    let width = img.width();
    let height = img.height();
    let mut alpha_map = Vec::with_capacity((width * height) as usize);

    for pixel in img.pixels() {
        let max_val = pixel[0].max(pixel[1]).max(pixel[2]);
        alpha_map.push(f32::from(max_val) / 255.0);
    }

    Ok((alpha_map, width, height))
}

/// Recover one color channel: `(watermarked - alpha * 255) / (1 - alpha)`.
///
/// `alpha` must already be clamped to at most [`MAX_ALPHA`]. The result is clamped
/// to `[0, 255]` and rounded half away from zero.
#[must_use]
pub fn reverse_channel(watermarked: u8, alpha: f32) -> u8 {
    let original = (f32::from(watermarked) - alpha * LOGO_VALUE) / (1.0 - alpha);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        original.clamp(0.0, 255.0).round() as u8
    }
}

/// Remove the watermark from a square region using reverse alpha blending.
///
/// Operates in-place on `image` with the region's top-left corner at
/// `(pos_x, pos_y)`. Pixels whose alpha is below [`ALPHA_THRESHOLD`] are left
/// unchanged; the alpha channel of every pixel is preserved.
///
/// # Arguments
///
/// * `image` - The buffer to modify in-place.
/// * `alpha_map` - Flat row-major alpha values, length `logo_size * logo_size`.
/// * `logo_size` - Side length of the watermark region in pixels.
/// * `pos_x` - X coordinate of the region's top-left corner.
/// * `pos_y` - Y coordinate of the region's top-left corner.
pub fn remove_watermark_alpha_blend(
    image: &mut RgbaImage,
    alpha_map: &[f32],
    logo_size: u32,
    pos_x: u32,
    pos_y: u32,
) {
    // Clip to image bounds
    let x2 = (pos_x + logo_size).min(image.width());
    let y2 = (pos_y + logo_size).min(image.height());

    if pos_x >= x2 || pos_y >= y2 {
        return;
    }

    for dy in 0..(y2 - pos_y) {
        for dx in 0..(x2 - pos_x) {
            let alpha = alpha_map[(dy * logo_size + dx) as usize];

            if alpha < ALPHA_THRESHOLD {
                continue;
            }

            let alpha = alpha.min(MAX_ALPHA);
            let px = image.get_pixel_mut(pos_x + dx, pos_y + dy);
            for ch in 0..3 {
                px[ch] = reverse_channel(px[ch], alpha);
            }
        }
    }
}

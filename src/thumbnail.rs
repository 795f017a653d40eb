//! Small JPEG previews for queued jobs and history entries.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::error::{Error, Result};

/// Default longest edge of a thumbnail in pixels.
pub const THUMBNAIL_MAX_EDGE: u32 = 64;

/// Default JPEG quality for thumbnails.
pub const THUMBNAIL_QUALITY: u8 = 82;

/// Thumbnail derivation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSpec {
    /// Longest edge of the output in pixels.
    pub max_edge: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            max_edge: THUMBNAIL_MAX_EDGE,
            quality: THUMBNAIL_QUALITY,
        }
    }
}

impl ThumbnailSpec {
    /// Decode `image_bytes` and derive a thumbnail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecodeFailure`] for undecodable input and
    /// [`Error::Encode`] if JPEG encoding fails.
    pub fn generate(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let decoded = image::load_from_memory(image_bytes).map_err(Error::DecodeFailure)?;
        self.generate_from(&decoded)
    }

    /// Derive a thumbnail from an already-decoded image.
    ///
    /// Images within the limit keep their size; the output is always JPEG, so
    /// transparency is flattened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if JPEG encoding fails.
    pub fn generate_from(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let (width, height) = image.dimensions();
        let (target_width, target_height) = target_size(width, height, self.max_edge);

        let rgb = if (target_width, target_height) == (width, height) {
            image.to_rgb8()
        } else {
            image
                .resize_exact(target_width, target_height, FilterType::Triangle)
                .to_rgb8()
        };

        let mut bytes = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, self.quality);
            encoder.encode_image(&rgb).map_err(Error::Encode)?;
        }
        Ok(bytes)
    }
}

/// Scale `(width, height)` so the longest edge is at most `max_edge`.
///
/// Never upscales; each side is at least one pixel.
#[must_use]
pub fn target_size(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }

    let scale = f64::from(max_edge) / f64::from(width.max(height));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

//! Core watermark removal engine.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, RgbaImage};
use log::debug;

use crate::alpha_maps::{AlphaMapCache, AssetSource, DirAssets};
use crate::blending;
use crate::error::{Error, Result};

/// Prefix of the suggested file name for a cleaned image.
pub const DEFAULT_DOWNLOAD_PREFIX: &str = "cleaned_";

/// Watermark size classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkSize {
    /// 48x48 watermark, 32px margin (images where either dimension <= 1024).
    Small,
    /// 96x96 watermark, 64px margin (images where both dimensions > 1024).
    Large,
}

impl WatermarkSize {
    /// Placement used for this size.
    #[must_use]
    pub fn placement(self) -> PlacementConfig {
        match self {
            Self::Small => PlacementConfig {
                logo_size: 48,
                margin_right: 32,
                margin_bottom: 32,
            },
            Self::Large => PlacementConfig {
                logo_size: 96,
                margin_right: 64,
                margin_bottom: 64,
            },
        }
    }
}

/// Logo size and distance from the bottom-right corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementConfig {
    /// Side length of the square logo.
    pub logo_size: u32,
    /// Gap between the logo and the right edge.
    pub margin_right: u32,
    /// Gap between the logo and the bottom edge.
    pub margin_bottom: u32,
}

/// Top-left corner and side length of the watermark region in an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// X coordinate of the top-left corner.
    pub x: u32,
    /// Y coordinate of the top-left corner.
    pub y: u32,
    /// Side length.
    pub size: u32,
}

/// Determine watermark size based on image dimensions.
///
/// - **Large** (96x96, 64px margin): both width AND height > 1024
/// - **Small** (48x48, 32px margin): otherwise (including 1024x1024)
#[must_use]
pub fn watermark_size_for(width: u32, height: u32) -> WatermarkSize {
    if width > 1024 && height > 1024 {
        WatermarkSize::Large
    } else {
        WatermarkSize::Small
    }
}

/// Placement config for the given dimensions.
#[must_use]
pub fn placement_for(width: u32, height: u32) -> PlacementConfig {
    watermark_size_for(width, height).placement()
}

/// Locate the watermark region for the given dimensions.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the logo and its margins do not fit.
pub fn region_for(width: u32, height: u32) -> Result<Region> {
    let placement = placement_for(width, height);
    let x = i64::from(width) - i64::from(placement.margin_right) - i64::from(placement.logo_size);
    let y =
        i64::from(height) - i64::from(placement.margin_bottom) - i64::from(placement.logo_size);

    match (u32::try_from(x), u32::try_from(y)) {
        (Ok(x), Ok(y)) => Ok(Region {
            x,
            y,
            size: placement.logo_size,
        }),
        _ => Err(Error::InvalidInput {
            width,
            height,
            logo_size: placement.logo_size,
        }),
    }
}

/// Suggested file name for a cleaned image, e.g. `cleaned_photo.png`.
#[must_use]
pub fn output_file_name(original_name: &str, prefix: &str) -> String {
    format!("{prefix}{original_name}")
}

/// Encode an image losslessly as PNG.
///
/// # Errors
///
/// Returns [`Error::Encode`] if encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(Error::Encode)?;
    Ok(buf.into_inner())
}

/// Anything that turns encoded input bytes into encoded output bytes.
///
/// [`WatermarkEngine`] is the production implementation; the batch queue only
/// depends on this trait.
pub trait ImageProcessor: Send + Sync {
    /// Process one encoded image.
    ///
    /// # Errors
    ///
    /// Returns the processor's failure for this image.
    fn process(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// The watermark engine holding the lazily loaded alpha maps.
///
/// Create once and reuse for multiple images; masks are loaded on first use
/// of each logo size and kept for the engine's lifetime.
pub struct WatermarkEngine {
    alpha_maps: AlphaMapCache,
}

impl WatermarkEngine {
    /// Create an engine reading reference assets from `source`.
    pub fn new(source: impl AssetSource + 'static) -> Self {
        Self {
            alpha_maps: AlphaMapCache::new(source),
        }
    }

    /// Create an engine reading `bg_48.png` and `bg_96.png` from `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(DirAssets::new(dir.as_ref()))
    }

    /// The mask cache backing this engine.
    #[must_use]
    pub fn alpha_maps(&self) -> &AlphaMapCache {
        &self.alpha_maps
    }

    /// Remove the watermark, returning a new image.
    ///
    /// The input is never modified. Pixels outside the watermark region, and
    /// every pixel's alpha channel, are copied through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the image is too small for its
    /// placement and [`Error::MissingAsset`] if the mask cannot be loaded.
    pub fn remove(&self, image: &RgbaImage) -> Result<RgbaImage> {
        let region = region_for(image.width(), image.height())?;
        let alpha_map = self.alpha_maps.get(region.size)?;

        let mut output = image.clone();
        blending::remove_watermark_alpha_blend(
            &mut output,
            alpha_map.values(),
            region.size,
            region.x,
            region.y,
        );

        debug!(
            "removed {}x{} watermark at ({}, {}) from {}x{} image",
            region.size,
            region.size,
            region.x,
            region.y,
            image.width(),
            image.height()
        );
        Ok(output)
    }

    /// Decode `input`, remove the watermark, and encode the result as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecodeFailure`] for malformed input, plus every error
    /// of [`WatermarkEngine::remove`].
    pub fn remove_bytes(&self, input: &[u8]) -> Result<Vec<u8>> {
        let decoded: DynamicImage =
            image::load_from_memory(input).map_err(Error::DecodeFailure)?;
        let cleaned = self.remove(&decoded.to_rgba8())?;
        encode_png(&cleaned)
    }
}

impl ImageProcessor for WatermarkEngine {
    fn process(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.remove_bytes(input)
    }
}

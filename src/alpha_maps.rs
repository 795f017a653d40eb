//! Reference opacity masks, loaded lazily and memoized per logo size.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::blending;
use crate::error::{Error, Result};

/// Logo sizes for which a reference asset exists.
pub const SUPPORTED_SIZES: [u32; 2] = [48, 96];

/// File name of the reference asset for a logo size, e.g. `bg_48.png`.
#[must_use]
pub fn asset_file_name(size: u32) -> String {
    format!("bg_{size}.png")
}

/// Immutable square opacity mask.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMap {
    size: u32,
    values: Vec<f32>,
}

impl AlphaMap {
    /// Decode an asset into a mask, requiring exactly `size x size` pixels.
    fn from_asset(size: u32, bytes: &[u8]) -> Result<Self> {
        let (values, width, height) =
            blending::calculate_alpha_map(bytes).map_err(|e| Error::MissingAsset {
                size,
                reason: e.to_string(),
            })?;

        if width != size || height != size {
            return Err(Error::MissingAsset {
                size,
                reason: format!("asset is {width}x{height}"),
            });
        }

        Ok(Self { size, values })
    }

    /// Side length in pixels.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Row-major opacity values in `[0, 1]`.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Opacity at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate lies outside the mask.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        assert!(x < self.size && y < self.size, "({x},{y}) outside mask");
        self.values[(y * self.size + x) as usize]
    }
}

/// Where reference assets come from.
pub trait AssetSource: Send + Sync {
    /// Read the encoded asset for `size`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the asset does not exist or cannot be read.
    fn load(&self, size: u32) -> std::io::Result<Vec<u8>>;
}

/// Assets stored as `bg_<size>.png` inside a directory.
#[derive(Debug, Clone)]
pub struct DirAssets {
    dir: PathBuf,
}

impl DirAssets {
    /// Serve assets from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory assets are read from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl AssetSource for DirAssets {
    fn load(&self, size: u32) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.dir.join(asset_file_name(size)))
    }
}

/// Assets held in memory, e.g. embedded with `include_bytes!`.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    assets: HashMap<u32, Vec<u8>>,
}

impl MemoryAssets {
    /// An empty set of assets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the encoded asset for `size`.
    #[must_use]
    pub fn with(mut self, size: u32, bytes: impl Into<Vec<u8>>) -> Self {
        self.assets.insert(size, bytes.into());
        self
    }
}

impl AssetSource for MemoryAssets {
    fn load(&self, size: u32) -> std::io::Result<Vec<u8>> {
        self.assets.get(&size).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no asset registered for {size}"),
            )
        })
    }
}

/// Memoizes one [`AlphaMap`] per logo size for the lifetime of the cache.
///
/// Load failures are not remembered, so a later call retries the asset.
pub struct AlphaMapCache {
    source: Box<dyn AssetSource>,
    maps: RwLock<HashMap<u32, Arc<AlphaMap>>>,
}

impl AlphaMapCache {
    /// Create an empty cache backed by `source`.
    pub fn new(source: impl AssetSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            maps: RwLock::new(HashMap::new()),
        }
    }

    /// Get the mask for `size`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAsset`] if `size` is unsupported or the asset
    /// cannot be read or decoded.
    pub fn get(&self, size: u32) -> Result<Arc<AlphaMap>> {
        if let Some(map) = self.maps.read().get(&size) {
            return Ok(Arc::clone(map));
        }

        if !SUPPORTED_SIZES.contains(&size) {
            return Err(Error::MissingAsset {
                size,
                reason: "unsupported logo size".to_string(),
            });
        }

        let bytes = self.source.load(size).map_err(|e| Error::MissingAsset {
            size,
            reason: format!("{}: {e}", asset_file_name(size)),
        })?;
        let map = Arc::new(AlphaMap::from_asset(size, &bytes)?);
        debug!("loaded {size}x{size} alpha map");

        let mut maps = self.maps.write();
        Ok(Arc::clone(maps.entry(size).or_insert(map)))
    }

    /// Whether the mask for `size` is already loaded.
    #[must_use]
    pub fn is_cached(&self, size: u32) -> bool {
        self.maps.read().contains_key(&size)
    }
}

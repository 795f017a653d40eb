//! Library settings, loadable from a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_DOWNLOAD_PREFIX;
use crate::error::{Error, Result};
use crate::history::RECENT_LIMIT;
use crate::thumbnail::{ThumbnailSpec, THUMBNAIL_MAX_EDGE, THUMBNAIL_QUALITY};

/// Settings for assets, history, thumbnails, and output naming.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `bg_48.png` and `bg_96.png`.
    pub asset_dir: PathBuf,
    /// `SQLite` database for history; in-memory history when unset.
    pub history_path: Option<PathBuf>,
    /// Maximum number of history entries.
    pub recent_limit: usize,
    /// Longest thumbnail edge in pixels.
    pub thumbnail_max_edge: u32,
    /// Thumbnail JPEG quality.
    pub thumbnail_quality: u8,
    /// Prefix of suggested output file names.
    pub download_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("assets"),
            history_path: None,
            recent_limit: RECENT_LIMIT,
            thumbnail_max_edge: THUMBNAIL_MAX_EDGE,
            thumbnail_quality: THUMBNAIL_QUALITY,
            download_prefix: DEFAULT_DOWNLOAD_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Read a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it is not valid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a JSON config document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        if !(1..=100).contains(&config.thumbnail_quality) {
            return Err(Error::Config(format!(
                "thumbnail_quality must be 1-100, got {}",
                config.thumbnail_quality
            )));
        }
        if config.recent_limit == 0 {
            return Err(Error::Config("recent_limit must be positive".to_string()));
        }
        if config.thumbnail_max_edge == 0 {
            return Err(Error::Config("thumbnail_max_edge must be positive".to_string()));
        }
        Ok(config)
    }

    /// Thumbnail parameters from this config.
    #[must_use]
    pub fn thumbnails(&self) -> ThumbnailSpec {
        ThumbnailSpec {
            max_edge: self.thumbnail_max_edge,
            quality: self.thumbnail_quality,
        }
    }
}

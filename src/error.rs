//! Error types for the nano-cleanse crate.

/// Errors that can occur while removing watermarks or managing results.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The reference opacity mask for a logo size could not be loaded.
    #[error("missing alpha map asset for {size}x{size}: {reason}")]
    MissingAsset {
        /// Logo size whose asset was requested.
        size: u32,
        /// Why the asset could not be used.
        reason: String,
    },

    /// The image is too small to contain the watermark region at its margin.
    #[error("image too small ({width}x{height}) for {logo_size}x{logo_size} watermark")]
    InvalidInput {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Logo size selected for these dimensions.
        logo_size: u32,
    },

    /// The input bytes could not be decoded as an image.
    #[error("failed to decode image: {0}")]
    DecodeFailure(#[source] image::ImageError),

    /// Encoding a result or thumbnail failed.
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    /// The history persistence layer is inaccessible.
    #[error("history store unavailable: {0}")]
    StoreUnavailable(String),

    /// An I/O error occurred while reading configuration or assets.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

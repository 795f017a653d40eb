//! Remove fixed-position translucent watermarks via reverse alpha blending.
//!
//! A white logo composited onto the bottom-right corner of an image is removed by
//! inverting the alpha-blending equation, using 48x48 and 96x96 opacity masks
//! loaded from reference assets. Results flow through a sequential
//! [`BatchQueue`] and are recorded in a capped, persisted [`HistoryStore`].
//!
//! # Quick Start
//!
//! ```no_run
//! use nano_cleanse::WatermarkEngine;
//!
//! let engine = WatermarkEngine::from_dir("assets");
//! let input = std::fs::read("photo.png").unwrap();
//! let cleaned = engine.remove_bytes(&input).expect("removal failed");
//! std::fs::write("cleaned_photo.png", cleaned).unwrap();
//! ```
//!
//! # Batches and history
//!
//! ```no_run
//! use std::sync::Arc;
//! use nano_cleanse::{Config, Coordinator, ImageInput};
//!
//! let coordinator = Arc::new(Coordinator::from_config(&Config::default()));
//! let queue = coordinator.batch_queue();
//! queue.enqueue([ImageInput::new("a.png", std::fs::read("a.png").unwrap())]);
//! queue.drain();
//! for entry in coordinator.recents() {
//!     println!("{} ({} bytes)", entry.name, entry.byte_size);
//! }
//! ```

#![deny(missing_docs)]

pub mod alpha_maps;
pub mod blending;
pub mod config;
pub mod coordinator;
mod engine;
pub mod error;
pub mod history;
pub mod queue;
pub mod thumbnail;

pub use alpha_maps::{AlphaMap, AlphaMapCache, AssetSource, DirAssets, MemoryAssets};
pub use config::Config;
pub use coordinator::{AppState, Coordinator, EditorState, ProcessedImage, View};
pub use engine::{
    encode_png, output_file_name, placement_for, region_for, watermark_size_for, ImageProcessor,
    PlacementConfig, Region, WatermarkEngine, WatermarkSize, DEFAULT_DOWNLOAD_PREFIX,
};
pub use error::{Error, Result};
pub use history::{
    Clock, HistoryEntry, HistoryStore, KeyValueStore, MemoryStore, SortOrder, SqliteStore,
    SystemClock, RECENT_LIMIT,
};
pub use queue::{BatchQueue, ImageInput, Job, JobId, JobStatus, ResultSink};
pub use thumbnail::ThumbnailSpec;

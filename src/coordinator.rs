//! Wires the engine, batch queue, and history together and owns the
//! application state a front end renders from.

use std::sync::Arc;

use bytes::Bytes;
use log::warn;
use parking_lot::Mutex;

use crate::config::Config;
use crate::engine::{output_file_name, WatermarkEngine, DEFAULT_DOWNLOAD_PREFIX};
use crate::error::Result;
use crate::history::{HistoryEntry, HistoryStore, MemoryStore, SortOrder, SqliteStore};
use crate::queue::{BatchQueue, ImageInput, ResultSink};
use crate::thumbnail::ThumbnailSpec;

/// Which screen the front end shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    /// Single-image before/after editor.
    #[default]
    Editor,
    /// Batch queue.
    Batch,
    /// History listing.
    Recents,
}

/// The image currently loaded in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorState {
    /// Declared file name.
    pub name: String,
    /// Image before removal.
    pub before: Bytes,
    /// Image after removal.
    pub after: Bytes,
}

impl EditorState {
    /// Size of the cleaned image in bytes.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.after.len()
    }
}

/// Everything the front end needs to render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    /// Current screen.
    pub view: View,
    /// History listing order.
    pub sort_order: SortOrder,
    /// History name filter; empty matches all.
    pub search_query: String,
    /// Loaded image, if any.
    pub editor: Option<EditorState>,
}

/// A cleaned image ready for the output boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    /// Declared name of the input.
    pub name: String,
    /// Suggested output file name.
    pub file_name: String,
    /// PNG bytes.
    pub bytes: Bytes,
}

/// Routes single images and batch results through the engine into history.
///
/// History is optional: when it is missing or failing, removal keeps working
/// and history operations degrade to no-ops with a logged warning.
pub struct Coordinator {
    engine: Arc<WatermarkEngine>,
    history: Option<HistoryStore>,
    thumbnails: ThumbnailSpec,
    download_prefix: String,
    state: Mutex<AppState>,
}

impl Coordinator {
    /// Coordinate `engine` with an optional `history`.
    pub fn new(engine: Arc<WatermarkEngine>, history: Option<HistoryStore>) -> Self {
        Self {
            engine,
            history,
            thumbnails: ThumbnailSpec::default(),
            download_prefix: DEFAULT_DOWNLOAD_PREFIX.to_string(),
            state: Mutex::new(AppState::default()),
        }
    }

    /// Build engine and history from `config`.
    ///
    /// An unavailable history database is logged and history is disabled.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let engine = Arc::new(WatermarkEngine::from_dir(&config.asset_dir));
        let history = match open_history(config) {
            Ok(history) => Some(history),
            Err(e) => {
                warn!("history disabled: {e}");
                None
            }
        };

        Self {
            thumbnails: config.thumbnails(),
            download_prefix: config.download_prefix.clone(),
            ..Self::new(engine, history)
        }
    }

    /// Use `prefix` for suggested output file names.
    #[must_use]
    pub fn with_download_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.download_prefix = prefix.into();
        self
    }

    /// The shared engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<WatermarkEngine> {
        &self.engine
    }

    /// The history store, if enabled.
    #[must_use]
    pub fn history(&self) -> Option<&HistoryStore> {
        self.history.as_ref()
    }

    /// A batch queue driving the shared engine that records into this
    /// coordinator's history.
    #[must_use]
    pub fn batch_queue(self: &Arc<Self>) -> BatchQueue {
        let engine: Arc<WatermarkEngine> = Arc::clone(&self.engine);
        let sink: Arc<dyn ResultSink> = Arc::clone(self) as Arc<dyn ResultSink>;
        BatchQueue::new(engine)
            .with_sink(sink)
            .with_thumbnails(self.thumbnails)
    }

    /// Suggested output file name for `name`.
    #[must_use]
    pub fn download_name(&self, name: &str) -> String {
        output_file_name(name, &self.download_prefix)
    }

    /// Clean one image and load it into the editor.
    ///
    /// On failure the editor is reset and the error returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns any error of [`WatermarkEngine::remove_bytes`].
    pub fn process_single(&self, input: ImageInput) -> Result<ProcessedImage> {
        let output = match self.engine.remove_bytes(&input.bytes) {
            Ok(output) => Bytes::from(output),
            Err(e) => {
                warn!("failed to process {}: {e}", input.name);
                self.reset_editor();
                return Err(e);
            }
        };

        {
            let mut state = self.state.lock();
            state.view = View::Editor;
            state.editor = Some(EditorState {
                name: input.name.clone(),
                before: input.bytes.clone(),
                after: output.clone(),
            });
        }
        self.record(&input.name, output.clone(), Some(input.bytes));

        Ok(ProcessedImage {
            file_name: self.download_name(&input.name),
            name: input.name,
            bytes: output,
        })
    }

    /// Store a result in history, logging instead of failing.
    pub fn record(&self, name: &str, result: Bytes, source: Option<Bytes>) {
        let Some(history) = &self.history else {
            return;
        };
        if let Err(e) = history.insert(name, result, source) {
            warn!("unable to save {name} to history: {e}");
        }
    }

    /// History entries in the current sort order, filtered by the current query.
    #[must_use]
    pub fn recents(&self) -> Vec<HistoryEntry> {
        let Some(history) = &self.history else {
            return Vec::new();
        };
        let (order, query) = {
            let state = self.state.lock();
            (state.sort_order, state.search_query.clone())
        };
        history.list(order, Some(&query)).unwrap_or_else(|e| {
            warn!("unable to load history: {e}");
            Vec::new()
        })
    }

    /// Load a history entry into the editor; the "before" image is the stored
    /// source, or the result when no source was kept.
    pub fn open_recent(&self, id: &str) -> Option<EditorState> {
        let entry = match self.history.as_ref()?.get(id) {
            Ok(entry) => entry?,
            Err(e) => {
                warn!("unable to load history entry {id}: {e}");
                return None;
            }
        };

        let editor = EditorState {
            before: entry.source_or_result().clone(),
            name: entry.name,
            after: entry.result,
        };
        let mut state = self.state.lock();
        state.view = View::Editor;
        state.editor = Some(editor.clone());
        Some(editor)
    }

    /// Delete one history entry.
    pub fn delete_recent(&self, id: &str) {
        if let Some(Err(e)) = self.history.as_ref().map(|h| h.delete(id)) {
            warn!("unable to delete history entry {id}: {e}");
        }
    }

    /// Delete every history entry.
    pub fn clear_recents(&self) {
        if let Some(Err(e)) = self.history.as_ref().map(HistoryStore::clear_all) {
            warn!("unable to clear history: {e}");
        }
    }

    /// Flip the history sort order, returning the new one.
    pub fn toggle_sort_order(&self) -> SortOrder {
        let mut state = self.state.lock();
        state.sort_order = state.sort_order.toggled();
        state.sort_order
    }

    /// Set the history name filter; surrounding whitespace is ignored.
    pub fn set_search_query(&self, query: impl AsRef<str>) {
        self.state.lock().search_query = query.as_ref().trim().to_string();
    }

    /// Switch screens.
    pub fn set_view(&self, view: View) {
        self.state.lock().view = view;
    }

    /// Unload the editor image.
    pub fn reset_editor(&self) {
        self.state.lock().editor = None;
    }

    /// Snapshot of the application state.
    #[must_use]
    pub fn state(&self) -> AppState {
        self.state.lock().clone()
    }
}

impl ResultSink for Coordinator {
    fn job_completed(&self, name: &str, result: &Bytes, source: &Bytes) {
        self.record(name, result.clone(), Some(source.clone()));
    }
}

fn open_history(config: &Config) -> Result<HistoryStore> {
    let history = match &config.history_path {
        Some(path) => HistoryStore::open(SqliteStore::open(path)?)?,
        None => HistoryStore::open(MemoryStore::new())?,
    };
    Ok(history
        .with_limit(config.recent_limit)
        .with_thumbnails(config.thumbnails()))
}

//! Bounded, persisted history of cleaned images.
//!
//! Every successful removal is recorded as a [`HistoryEntry`] with a small JPEG
//! thumbnail. The store keeps at most `limit` entries (50 by default); after
//! each insert the oldest entries by `(created_at, seq)` are evicted, so two
//! entries created in the same millisecond are ordered by insertion. Eviction
//! reads only keys, never image payloads.

mod sqlite;
mod store;

pub use sqlite::SqliteStore;
pub use store::{KeyValueStore, MemoryStore};

use bytes::Bytes;
use log::{debug, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::thumbnail::ThumbnailSpec;

/// Maximum number of history entries kept by default.
pub const RECENT_LIMIT: usize = 50;

/// Creation order of a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first.
    Asc,
    /// Newest first.
    #[default]
    Desc,
}

impl SortOrder {
    /// The opposite order.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// One recorded result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Unique id (UUID v4).
    pub id: String,
    /// Original file name.
    pub name: String,
    /// Size of `result` in bytes.
    pub byte_size: u64,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Insertion sequence, breaks ties between equal `created_at`.
    pub seq: i64,
    /// JPEG thumbnail of the result.
    pub thumbnail: Bytes,
    /// The cleaned image.
    pub result: Bytes,
    /// The image as supplied, when it was kept.
    pub source: Option<Bytes>,
}

impl HistoryEntry {
    /// The "before" image: the source if stored, otherwise the result.
    #[must_use]
    pub fn source_or_result(&self) -> &Bytes {
        self.source.as_ref().unwrap_or(&self.result)
    }

    pub(crate) fn sort_key(&self) -> (i64, i64) {
        (self.created_at, self.seq)
    }
}

/// Source of creation timestamps.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Insertion bookkeeping, guarded together so put and prune are atomic
/// with respect to other inserts.
struct Cursor {
    next_seq: i64,
    last_created_at: i64,
}

/// Capped, searchable history over a [`KeyValueStore`].
///
/// `created_at` never decreases across inserts, even if the clock steps back.
pub struct HistoryStore {
    store: Box<dyn KeyValueStore>,
    clock: Box<dyn Clock>,
    thumbnails: ThumbnailSpec,
    limit: usize,
    cursor: Mutex<Cursor>,
}

impl HistoryStore {
    /// Wrap `store`, continuing the insertion sequence and timestamps of
    /// entries already in it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if existing entries cannot be read.
    pub fn open(store: impl KeyValueStore + 'static) -> Result<Self> {
        let cursor = match store.high_water()? {
            Some((created_at, seq)) => Cursor {
                next_seq: seq + 1,
                last_created_at: created_at,
            },
            None => Cursor {
                next_seq: 0,
                last_created_at: i64::MIN,
            },
        };

        Ok(Self {
            store: Box::new(store),
            clock: Box::new(SystemClock),
            thumbnails: ThumbnailSpec::default(),
            limit: RECENT_LIMIT,
            cursor: Mutex::new(cursor),
        })
    }

    /// Use `clock` for creation timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Keep at most `limit` entries.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Derive thumbnails with `spec`.
    #[must_use]
    pub fn with_thumbnails(mut self, spec: ThumbnailSpec) -> Self {
        self.thumbnails = spec;
        self
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Record a result, then evict entries beyond the cap.
    ///
    /// The entry is stored once this returns `Ok`. A failed eviction is logged
    /// and retried on the next insert or [`HistoryStore::prune`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DecodeFailure`] if `result` is not a decodable
    /// image, or [`crate::Error::StoreUnavailable`] if persisting fails.
    pub fn insert(&self, name: &str, result: Bytes, source: Option<Bytes>) -> Result<HistoryEntry> {
        let thumbnail = Bytes::from(self.thumbnails.generate(&result)?);

        let mut cursor = self.cursor.lock();
        let created_at = self.clock.now_ms().max(cursor.last_created_at);
        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            byte_size: result.len() as u64,
            created_at,
            seq: cursor.next_seq,
            thumbnail,
            result,
            source,
        };
        self.store.put(&entry)?;
        cursor.next_seq += 1;
        cursor.last_created_at = created_at;
        debug!("recorded history entry {} ({})", entry.id, entry.name);

        if let Err(e) = self.prune_locked() {
            warn!("history entry {} stored but eviction failed: {e}", entry.id);
        }
        Ok(entry)
    }

    /// Delete entries beyond the `limit` most recent; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    pub fn prune(&self) -> Result<usize> {
        let _guard = self.cursor.lock();
        self.prune_locked()
    }

    fn prune_locked(&self) -> Result<usize> {
        let stale = self.store.ids(SortOrder::Desc, self.limit)?;
        for id in &stale {
            self.store.delete(id)?;
        }
        if !stale.is_empty() {
            debug!("evicted {} history entries", stale.len());
        }
        Ok(stale.len())
    }

    /// Entries in creation order, optionally filtered by a case-insensitive
    /// substring of the name. An empty filter matches everything.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    pub fn list(&self, order: SortOrder, name_filter: Option<&str>) -> Result<Vec<HistoryEntry>> {
        let entries = self.store.range(order, self.limit)?;
        let needle = match name_filter {
            Some(q) if !q.is_empty() => q.to_lowercase(),
            _ => return Ok(entries),
        };
        Ok(entries
            .into_iter()
            .filter(|e| e.name.to_lowercase().contains(&needle))
            .collect())
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    pub fn len(&self) -> Result<usize> {
        self.store.count()
    }

    /// Whether the store holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.store.count()? == 0)
    }

    /// Fetch one entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    pub fn get(&self, id: &str) -> Result<Option<HistoryEntry>> {
        self.store.get(id)
    }

    /// Remove one entry; unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id)
    }

    /// Remove every entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    pub fn clear_all(&self) -> Result<()> {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::encode_png;
    use image::RgbaImage;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ManualClock(Arc<AtomicI64>);

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn png() -> Bytes {
        Bytes::from(encode_png(&RgbaImage::new(120, 80)).unwrap())
    }

    fn stored(id: &str, created_at: i64, seq: i64) -> HistoryEntry {
        HistoryEntry {
            id: id.to_string(),
            name: format!("{id}.png"),
            byte_size: 0,
            created_at,
            seq,
            thumbnail: Bytes::new(),
            result: Bytes::new(),
            source: None,
        }
    }

    #[test]
    fn insert_fills_metadata_and_thumbnail() {
        let history = HistoryStore::open(MemoryStore::new()).unwrap();
        let result = png();
        let entry = history.insert("a.png", result.clone(), None).unwrap();

        assert_eq!(entry.name, "a.png");
        assert_eq!(entry.byte_size, result.len() as u64);
        assert_eq!(entry.source_or_result(), &result);
        let thumb = image::load_from_memory(&entry.thumbnail).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (64, 43));
        assert_eq!(history.get(&entry.id).unwrap(), Some(entry));
    }

    #[test]
    fn insert_rejects_undecodable_result() {
        let history = HistoryStore::open(MemoryStore::new()).unwrap();
        assert!(history
            .insert("bad.png", Bytes::from_static(b"nope"), None)
            .is_err());
        assert!(history.is_empty().unwrap());
    }

    #[test]
    fn ties_are_broken_by_insertion_order() {
        let now = Arc::new(AtomicI64::new(1_000));
        let history = HistoryStore::open(MemoryStore::new())
            .unwrap()
            .with_clock(ManualClock(Arc::clone(&now)))
            .with_limit(2);

        let first = history.insert("first", png(), None).unwrap();
        let second = history.insert("second", png(), None).unwrap();
        let third = history.insert("third", png(), None).unwrap();

        let ids: Vec<String> = history
            .list(SortOrder::Desc, None)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, [third.id, second.id]);
        assert!(history.get(&first.id).unwrap().is_none());
    }

    #[test]
    fn clock_stepping_back_keeps_newest_entry() {
        let now = Arc::new(AtomicI64::new(1_000));
        let history = HistoryStore::open(MemoryStore::new())
            .unwrap()
            .with_clock(ManualClock(Arc::clone(&now)))
            .with_limit(1);

        let older = history.insert("older", png(), None).unwrap();
        now.store(900, Ordering::SeqCst);
        let newer = history.insert("newer", png(), None).unwrap();

        assert_eq!(newer.created_at, 1_000);
        assert!(history.get(&older.id).unwrap().is_none());
        assert_eq!(history.get(&newer.id).unwrap(), Some(newer));

        now.store(2_000, Ordering::SeqCst);
        let later = history.insert("later", png(), None).unwrap();
        assert_eq!(later.created_at, 2_000);
    }

    #[test]
    fn open_resumes_after_latest_timestamp() {
        let store = MemoryStore::new();
        store.put(&stored("old", 5_000, 3)).unwrap();

        let history = HistoryStore::open(store)
            .unwrap()
            .with_clock(ManualClock(Arc::new(AtomicI64::new(10))));
        let entry = history.insert("new.png", png(), None).unwrap();

        assert_eq!((entry.created_at, entry.seq), (5_000, 4));
        let names: Vec<String> = history
            .list(SortOrder::Desc, None)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["new.png", "old.png"]);
    }

    /// Counts payload-bearing reads and can refuse deletes.
    struct Tracking {
        inner: MemoryStore,
        payload_reads: AtomicUsize,
        fail_deletes: bool,
    }

    impl Tracking {
        fn new(fail_deletes: bool) -> Self {
            Self {
                inner: MemoryStore::new(),
                payload_reads: AtomicUsize::new(0),
                fail_deletes,
            }
        }
    }

    impl KeyValueStore for Tracking {
        fn get(&self, id: &str) -> Result<Option<HistoryEntry>> {
            self.inner.get(id)
        }

        fn range(&self, order: SortOrder, limit: usize) -> Result<Vec<HistoryEntry>> {
            let entries = self.inner.range(order, limit)?;
            self.payload_reads.fetch_add(entries.len(), Ordering::SeqCst);
            Ok(entries)
        }

        fn ids(&self, order: SortOrder, offset: usize) -> Result<Vec<String>> {
            self.inner.ids(order, offset)
        }

        fn count(&self) -> Result<usize> {
            self.inner.count()
        }

        fn high_water(&self) -> Result<Option<(i64, i64)>> {
            self.inner.high_water()
        }

        fn put(&self, entry: &HistoryEntry) -> Result<()> {
            self.inner.put(entry)
        }

        fn delete(&self, id: &str) -> Result<()> {
            if self.fail_deletes {
                return Err(crate::Error::StoreUnavailable("read-only".to_string()));
            }
            self.inner.delete(id)
        }

        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }
    }

    #[test]
    fn eviction_reads_no_payloads() {
        let store = Arc::new(Tracking::new(false));
        let history = HistoryStore::open(Arc::clone(&store))
            .unwrap()
            .with_limit(3);

        for i in 0..5 {
            history
                .insert(&format!("{i}.png"), png(), Some(png()))
                .unwrap();
        }
        assert_eq!(history.len().unwrap(), 3);
        assert!(!history.is_empty().unwrap());
        assert_eq!(history.prune().unwrap(), 0);

        assert_eq!(store.payload_reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_eviction_still_reports_stored_entry() {
        let history = HistoryStore::open(Tracking::new(true))
            .unwrap()
            .with_limit(1);

        history.insert("first.png", png(), None).unwrap();
        let second = history.insert("second.png", png(), None).unwrap();

        assert_eq!(history.get(&second.id).unwrap(), Some(second));
        assert_eq!(history.len().unwrap(), 2);
        assert!(history.prune().is_err());
    }

    #[test]
    fn empty_filter_matches_everything() {
        let history = HistoryStore::open(MemoryStore::new()).unwrap();
        history.insert("one.png", png(), None).unwrap();
        history.insert("two.png", png(), None).unwrap();

        assert_eq!(history.list(SortOrder::Asc, Some("")).unwrap().len(), 2);
        assert_eq!(history.list(SortOrder::Asc, Some("TWO")).unwrap().len(), 1);
        assert!(history.list(SortOrder::Asc, Some("three")).unwrap().is_empty());
    }

    #[test]
    fn open_continues_sequence() {
        let store = MemoryStore::new();
        store.put(&stored("old", 0, 41)).unwrap();

        let history = HistoryStore::open(store).unwrap();
        let entry = history.insert("new.png", png(), None).unwrap();
        assert_eq!(entry.seq, 42);
    }

    #[test]
    fn delete_and_clear_all() {
        let history = HistoryStore::open(MemoryStore::new()).unwrap();
        let a = history.insert("a.png", png(), None).unwrap();
        history.insert("b.png", png(), None).unwrap();

        history.delete(&a.id).unwrap();
        history.delete("not-there").unwrap();
        assert_eq!(history.len().unwrap(), 1);

        history.clear_all().unwrap();
        assert!(history.is_empty().unwrap());
    }

    #[test]
    fn sort_order_toggles() {
        assert_eq!(SortOrder::default(), SortOrder::Desc);
        assert_eq!(SortOrder::Desc.toggled(), SortOrder::Asc);
        assert_eq!(SortOrder::Asc.toggled(), SortOrder::Desc);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{HistoryEntry, SortOrder};
use crate::error::Result;

/// Keyed persistence for history records, ordered by `(created_at, seq)`.
pub trait KeyValueStore: Send + Sync {
    /// Fetch one record by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    fn get(&self, id: &str) -> Result<Option<HistoryEntry>>;

    /// Up to `limit` records in the given creation order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    fn range(&self, order: SortOrder, limit: usize) -> Result<Vec<HistoryEntry>>;

    /// Ids of the records in the given creation order, skipping the first `offset`.
    ///
    /// Only keys are read, so eviction never loads image payloads.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    fn ids(&self, order: SortOrder, offset: usize) -> Result<Vec<String>>;

    /// Number of records.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    fn count(&self) -> Result<usize>;

    /// Largest `created_at` and largest `seq` stored, if any record exists.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    fn high_water(&self) -> Result<Option<(i64, i64)>>;

    /// Insert or replace a record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    fn put(&self, entry: &HistoryEntry) -> Result<()>;

    /// Remove a record; unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    fn delete(&self, id: &str) -> Result<()>;

    /// Remove every record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the backend fails.
    fn clear(&self) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, id: &str) -> Result<Option<HistoryEntry>> {
        (**self).get(id)
    }

    fn range(&self, order: SortOrder, limit: usize) -> Result<Vec<HistoryEntry>> {
        (**self).range(order, limit)
    }

    fn ids(&self, order: SortOrder, offset: usize) -> Result<Vec<String>> {
        (**self).ids(order, offset)
    }

    fn count(&self) -> Result<usize> {
        (**self).count()
    }

    fn high_water(&self) -> Result<Option<(i64, i64)>> {
        (**self).high_water()
    }

    fn put(&self, entry: &HistoryEntry) -> Result<()> {
        (**self).put(entry)
    }

    fn delete(&self, id: &str) -> Result<()> {
        (**self).delete(id)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// Process-local store; contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, HistoryEntry>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<HistoryEntry>> {
        Ok(self.entries.read().get(id).cloned())
    }

    fn range(&self, order: SortOrder, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by_key(HistoryEntry::sort_key);
        if order == SortOrder::Desc {
            entries.reverse();
        }
        entries.truncate(limit);
        Ok(entries)
    }

    fn ids(&self, order: SortOrder, offset: usize) -> Result<Vec<String>> {
        let entries = self.entries.read();
        let mut keys: Vec<((i64, i64), &str)> = entries
            .values()
            .map(|e| (e.sort_key(), e.id.as_str()))
            .collect();
        keys.sort_unstable();
        if order == SortOrder::Desc {
            keys.reverse();
        }
        Ok(keys
            .into_iter()
            .skip(offset)
            .map(|(_, id)| id.to_string())
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }

    fn high_water(&self) -> Result<Option<(i64, i64)>> {
        let entries = self.entries.read();
        let created_at = entries.values().map(|e| e.created_at).max();
        let seq = entries.values().map(|e| e.seq).max();
        Ok(created_at.zip(seq))
    }

    fn put(&self, entry: &HistoryEntry) -> Result<()> {
        self.entries.write().insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.entries.write().remove(id);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn entry(id: &str, created_at: i64, seq: i64) -> HistoryEntry {
        HistoryEntry {
            id: id.to_string(),
            name: format!("{id}.png"),
            byte_size: 3,
            created_at,
            seq,
            thumbnail: Bytes::new(),
            result: Bytes::from_static(b"abc"),
            source: None,
        }
    }

    #[test]
    fn range_orders_by_created_at_then_seq() {
        let store = MemoryStore::new();
        store.put(&entry("b", 10, 2)).unwrap();
        store.put(&entry("a", 10, 1)).unwrap();
        store.put(&entry("c", 5, 3)).unwrap();

        let asc: Vec<String> = store
            .range(SortOrder::Asc, 10)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(asc, ["c", "a", "b"]);

        let desc: Vec<String> = store
            .range(SortOrder::Desc, 2)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(desc, ["b", "a"]);
    }

    #[test]
    fn ids_skip_offset_in_order() {
        let store = MemoryStore::new();
        store.put(&entry("b", 10, 2)).unwrap();
        store.put(&entry("a", 10, 1)).unwrap();
        store.put(&entry("c", 5, 3)).unwrap();

        assert_eq!(store.ids(SortOrder::Desc, 1).unwrap(), ["a", "c"]);
        assert_eq!(store.ids(SortOrder::Asc, 0).unwrap(), ["c", "a", "b"]);
        assert!(store.ids(SortOrder::Asc, 5).unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.high_water().unwrap(), Some((10, 3)));
        assert_eq!(MemoryStore::new().high_water().unwrap(), None);
    }

    #[test]
    fn delete_unknown_id_is_a_no_op() {
        let store = MemoryStore::new();
        store.put(&entry("a", 1, 1)).unwrap();
        store.delete("zzz").unwrap();
        assert!(store.get("a").unwrap().is_some());

        store.clear().unwrap();
        assert!(store.get("a").unwrap().is_none());
    }
}

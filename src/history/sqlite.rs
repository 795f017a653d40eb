//! SQLite-backed history persistence.

use std::path::Path;

use bytes::Bytes;
use log::debug;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::store::KeyValueStore;
use super::{HistoryEntry, SortOrder};
use crate::error::Result;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS history (
        id         TEXT PRIMARY KEY,
        name       TEXT NOT NULL,
        byte_size  INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        seq        INTEGER NOT NULL,
        thumbnail  BLOB NOT NULL,
        result     BLOB NOT NULL,
        source     BLOB
    );
    CREATE INDEX IF NOT EXISTS idx_history_created_at ON history (created_at, seq);
";

const COLUMNS: &str = "id, name, byte_size, created_at, seq, thumbnail, result, source";

/// History records in a single SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the database cannot be
    /// opened or its schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("opening history database at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    /// A private database that lives as long as the store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if `SQLite` cannot be initialised.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let byte_size: i64 = row.get(2)?;
    let thumbnail: Vec<u8> = row.get(5)?;
    let result: Vec<u8> = row.get(6)?;
    let source: Option<Vec<u8>> = row.get(7)?;
    Ok(HistoryEntry {
        id: row.get(0)?,
        name: row.get(1)?,
        byte_size: u64::try_from(byte_size).unwrap_or_default(),
        created_at: row.get(3)?,
        seq: row.get(4)?,
        thumbnail: Bytes::from(thumbnail),
        result: Bytes::from(result),
        source: source.map(Bytes::from),
    })
}

impl KeyValueStore for SqliteStore {
    fn get(&self, id: &str) -> Result<Option<HistoryEntry>> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM history WHERE id = ?1"),
                params![id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn range(&self, order: SortOrder, limit: usize) -> Result<Vec<HistoryEntry>> {
        let direction = match order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let sql = format!(
            "SELECT {COLUMNS} FROM history ORDER BY created_at {direction}, seq {direction} LIMIT ?1"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![limit], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn ids(&self, order: SortOrder, offset: usize) -> Result<Vec<String>> {
        let direction = match order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let sql = format!(
            "SELECT id FROM history ORDER BY created_at {direction}, seq {direction} LIMIT -1 OFFSET ?1"
        );
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![offset], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn high_water(&self) -> Result<Option<(i64, i64)>> {
        let (created_at, seq): (Option<i64>, Option<i64>) = self.conn.lock().query_row(
            "SELECT MAX(created_at), MAX(seq) FROM history",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(created_at.zip(seq))
    }

    fn put(&self, entry: &HistoryEntry) -> Result<()> {
        let byte_size = i64::try_from(entry.byte_size).unwrap_or(i64::MAX);
        self.conn.lock().execute(
            &format!("INSERT OR REPLACE INTO history ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                entry.id,
                entry.name,
                byte_size,
                entry.created_at,
                entry.seq,
                &entry.thumbnail[..],
                &entry.result[..],
                entry.source.as_deref(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM history WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn.lock().execute("DELETE FROM history", [])?;
        Ok(())
    }
}

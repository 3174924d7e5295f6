//! Entry Store.
//!
//! An embedded, file-backed, append-only table of [`Entry`] rows.  The store
//! assigns ids and answers "next row after id N" queries; it never looks
//! inside a payload.
//!
//! # Storage layout
//!
//! A single table `replaydb` (the layout earlier recorder tooling wrote, so
//! old logs stay readable):
//!
//! | column    | type    | description                                  |
//! |-----------|---------|----------------------------------------------|
//! | id        | INTEGER | Primary key, strictly increasing             |
//! | key       | TEXT    | Topic / channel name                         |
//! | timestamp | REAL    | Seconds since the Unix epoch at record time  |
//! | data_type | TEXT    | [`TypeTag`] string                           |
//! | data      | BLOB    | Encoded payload                              |
//!
//! # Example
//!
//! ```rust
//! use rewind_log::store::EntryStore;
//! use rewind_types::TypeTag;
//!
//! let store = EntryStore::open_in_memory().unwrap();
//! let id = store.append("odom", 1.0, TypeTag::Str, b"hello").unwrap();
//!
//! let entry = store.next_after(0).unwrap().unwrap();
//! assert_eq!(entry.id, id);
//! assert!(store.next_after(id).unwrap().is_none());
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rewind_types::{Entry, TypeTag};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::ReplayError;

const SELECT_ENTRY: &str = "SELECT id, key, timestamp, data_type, data FROM replaydb";

// ─────────────────────────────────────────────────────────────────────────────
// Mode
// ─────────────────────────────────────────────────────────────────────────────

/// How a log is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// The log must already exist; it is opened read-only.
    Read,
    /// The log is created, replacing any existing file at the path.
    Write,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => write!(f, "read"),
            Mode::Write => write!(f, "write"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "read" => Ok(Mode::Read),
            "w" | "write" => Ok(Mode::Write),
            other => Err(format!("unknown mode {other:?} (expected r or w)")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EntryStore
// ─────────────────────────────────────────────────────────────────────────────

struct RawRow {
    id: i64,
    key: String,
    timestamp: f64,
    data_type: String,
    data: Vec<u8>,
}

impl RawRow {
    fn into_entry(self) -> Result<Entry, ReplayError> {
        let Ok(type_tag) = self.data_type.parse::<TypeTag>() else {
            return Err(ReplayError::UndecodableEntry {
                id: self.id,
                key: self.key,
                data_type: self.data_type,
            });
        };
        Ok(Entry {
            id: self.id,
            key: self.key,
            timestamp: self.timestamp,
            type_tag,
            payload: self.data,
        })
    }
}

/// SQLite-backed append-only entry table.
pub struct EntryStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl EntryStore {
    /// Open the log at `path`.
    ///
    /// * [`Mode::Write`] creates missing parent directories and replaces any
    ///   existing file (with a warning): last writer wins.
    /// * [`Mode::Read`] requires the file to exist and hold a replay table.
    pub fn open(path: impl AsRef<Path>, mode: Mode) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let open_failure = |reason: String| ReplayError::StorageOpenFailure {
            path: path.to_path_buf(),
            reason,
        };

        let conn = match mode {
            Mode::Write => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).map_err(|e| open_failure(e.to_string()))?;
                }
                if path.exists() {
                    warn!(path = %path.display(), "replay log already exists, overwriting");
                    fs::remove_file(path).map_err(|e| open_failure(e.to_string()))?;
                }
                Connection::open(path).map_err(|e| open_failure(e.to_string()))?
            }
            Mode::Read => {
                if !path.is_file() {
                    return Err(open_failure("no such file".to_string()));
                }
                Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                    .map_err(|e| open_failure(e.to_string()))?
            }
        };

        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        match mode {
            Mode::Write => store.init_schema()?,
            Mode::Read => {
                if !store.has_table().map_err(|e| open_failure(e.to_string()))? {
                    return Err(open_failure("not a replay log (missing replaydb table)".into()));
                }
            }
        }
        info!(path = %path.display(), %mode, "opened replay log");
        Ok(store)
    }

    /// Open a temporary in-memory log (useful for testing).
    pub fn open_in_memory() -> Result<Self, ReplayError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), ReplayError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS replaydb (
                id        INTEGER NOT NULL PRIMARY KEY,
                key       VARCHAR(255) NOT NULL,
                timestamp REAL NOT NULL,
                data_type VARCHAR(255) NOT NULL,
                data      BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS replaydb_key_id ON replaydb (key, id);",
        )?;
        Ok(())
    }

    fn has_table(&self) -> Result<bool, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'replaydb'",
                [],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
    }

    /// File backing this store, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one row and return its id.
    pub fn append(
        &self,
        key: &str,
        timestamp: f64,
        type_tag: TypeTag,
        payload: &[u8],
    ) -> Result<i64, ReplayError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO replaydb (key, timestamp, data_type, data) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![key, timestamp, type_tag.as_str(), payload])?;
        let id = self.conn.last_insert_rowid();
        debug!(id, key, %type_tag, bytes = payload.len(), "appended entry");
        Ok(id)
    }

    /// The entry with the smallest id greater than `after_id`, any key.
    pub fn next_after(&self, after_id: i64) -> Result<Option<Entry>, ReplayError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{SELECT_ENTRY} WHERE id > ?1 ORDER BY id LIMIT 1"))?;
        let row = stmt.query_row(params![after_id], read_row).optional()?;
        row.map(RawRow::into_entry).transpose()
    }

    /// The entry with the smallest id greater than `after_id` filed under `key`.
    pub fn next_after_for_key(
        &self,
        key: &str,
        after_id: i64,
    ) -> Result<Option<Entry>, ReplayError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_ENTRY} WHERE key = ?1 AND id > ?2 ORDER BY id LIMIT 1"
        ))?;
        let row = stmt.query_row(params![key, after_id], read_row).optional()?;
        row.map(RawRow::into_entry).transpose()
    }

    /// Number of rows in the log.
    pub fn len(&self) -> Result<u64, ReplayError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM replaydb", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    /// `true` when the log holds no rows.
    pub fn is_empty(&self) -> Result<bool, ReplayError> {
        Ok(self.len()? == 0)
    }

    /// Every key with its entry count, ordered by key.
    pub fn key_counts(&self) -> Result<Vec<(String, u64)>, ReplayError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, COUNT(*) FROM replaydb GROUP BY key ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let n: i64 = row.get(1)?;
            Ok((key, n.max(0) as u64))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Smallest and largest recorded timestamps, `None` for an empty log.
    pub fn time_span(&self) -> Result<Option<(f64, f64)>, ReplayError> {
        let span: (Option<f64>, Option<f64>) = self.conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM replaydb",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(match span {
            (Some(first), Some(last)) => Some((first, last)),
            _ => None,
        })
    }

    /// Release the underlying SQLite handle.
    pub fn close(self) -> Result<(), ReplayError> {
        self.conn.close().map_err(|(_, e)| ReplayError::Sqlite(e))
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        key: row.get(1)?,
        timestamp: row.get(2)?,
        data_type: row.get(3)?,
        data: row.get(4)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> EntryStore {
        let store = EntryStore::open_in_memory().unwrap();
        store.append("a", 1.0, TypeTag::Str, b"x").unwrap();
        store.append("b", 2.0, TypeTag::Str, b"y").unwrap();
        store.append("a", 3.0, TypeTag::Str, b"z").unwrap();
        store
    }

    #[test]
    fn ids_follow_insertion_order() {
        let store = EntryStore::open_in_memory().unwrap();
        let ids: Vec<i64> = (0..5)
            .map(|i| store.append("k", f64::from(i), TypeTag::Int, &[i as u8]).unwrap())
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(ids[0] > 0);
    }

    #[test]
    fn next_after_walks_the_whole_log() {
        let store = seeded();
        let mut cursor = 0;
        let mut payloads = Vec::new();
        while let Some(entry) = store.next_after(cursor).unwrap() {
            cursor = entry.id;
            payloads.push(entry.payload);
        }
        assert_eq!(payloads, vec![b"x".to_vec(), b"y".to_vec(), b"z".to_vec()]);
    }

    #[test]
    fn next_after_for_key_skips_other_keys() {
        let store = seeded();
        let first = store.next_after_for_key("a", 0).unwrap().unwrap();
        assert_eq!(first.payload, b"x");
        let second = store.next_after_for_key("a", first.id).unwrap().unwrap();
        assert_eq!(second.payload, b"z");
        assert!(store.next_after_for_key("a", second.id).unwrap().is_none());
        assert!(store.next_after_for_key("missing", 0).unwrap().is_none());
    }

    #[test]
    fn entry_fields_roundtrip() {
        let store = EntryStore::open_in_memory().unwrap();
        store
            .append("camera", 1_700_000_000.125, TypeTag::Bytes, &[0, 159, 255])
            .unwrap();
        let entry = store.next_after(0).unwrap().unwrap();
        assert_eq!(entry.key, "camera");
        assert_eq!(entry.timestamp, 1_700_000_000.125);
        assert_eq!(entry.type_tag, TypeTag::Bytes);
        assert_eq!(entry.payload, vec![0, 159, 255]);
    }

    #[test]
    fn summary_queries() {
        let store = seeded();
        assert_eq!(store.len().unwrap(), 3);
        assert!(!store.is_empty().unwrap());
        assert_eq!(
            store.key_counts().unwrap(),
            vec![("a".to_string(), 2), ("b".to_string(), 1)]
        );
        assert_eq!(store.time_span().unwrap(), Some((1.0, 3.0)));

        let empty = EntryStore::open_in_memory().unwrap();
        assert!(empty.is_empty().unwrap());
        assert_eq!(empty.time_span().unwrap(), None);
    }

    #[test]
    fn read_mode_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = EntryStore::open(dir.path().join("nope.db"), Mode::Read).err().unwrap();
        assert!(matches!(err, ReplayError::StorageOpenFailure { .. }));
    }

    #[test]
    fn read_mode_rejects_foreign_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER);")
            .unwrap();
        let err = EntryStore::open(&path, Mode::Read).err().unwrap();
        assert!(err.to_string().contains("missing replaydb table"));
    }

    #[test]
    fn write_mode_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/log.db");
        let store = EntryStore::open(&path, Mode::Write).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        store.close().unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn write_mode_overwrites_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");

        let store = EntryStore::open(&path, Mode::Write).unwrap();
        store.append("old", 1.0, TypeTag::Str, b"stale").unwrap();
        store.close().unwrap();

        let store = EntryStore::open(&path, Mode::Write).unwrap();
        assert!(store.is_empty().unwrap());
        let id = store.append("new", 2.0, TypeTag::Str, b"fresh").unwrap();
        assert_eq!(id, 1);
        store.close().unwrap();

        let reader = EntryStore::open(&path, Mode::Read).unwrap();
        let only = reader.next_after(0).unwrap().unwrap();
        assert_eq!(only.key, "new");
        assert!(reader.next_after(only.id).unwrap().is_none());
    }

    #[test]
    fn reads_rows_without_the_key_index() {
        // Logs written by older tooling carry only the bare table.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE replaydb (
                id INTEGER NOT NULL PRIMARY KEY,
                key VARCHAR(255) NOT NULL,
                timestamp REAL NOT NULL,
                data_type VARCHAR(255) NOT NULL,
                data BLOB NOT NULL
            );
            INSERT INTO replaydb (key, timestamp, data_type, data)
                VALUES ('test', 12.5, 'str', X'74657374');",
        )
        .unwrap();
        drop(conn);

        let store = EntryStore::open(&path, Mode::Read).unwrap();
        let entry = store.next_after_for_key("test", 0).unwrap().unwrap();
        assert_eq!(entry.as_text().unwrap(), "test");
    }

    #[test]
    fn unknown_tag_in_log_is_reported() {
        let store = EntryStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO replaydb (key, timestamp, data_type, data) VALUES ('k', 0, 'pickle', X'00')",
                [],
            )
            .unwrap();
        let err = store.next_after(0).err().unwrap();
        assert!(matches!(
            err,
            ReplayError::UndecodableEntry { id: 1, ref key, ref data_type }
                if key == "k" && data_type == "pickle"
        ));
        let err = store.next_after_for_key("k", 0).err().unwrap();
        assert_eq!(err.entry_id(), Some(1));
    }

    #[test]
    fn mode_parses_short_and_long_forms() {
        assert_eq!("r".parse::<Mode>().unwrap(), Mode::Read);
        assert_eq!("write".parse::<Mode>().unwrap(), Mode::Write);
        assert!("rw".parse::<Mode>().is_err());
    }
}

//! [`Player`] – the read side of a replay session.
//!
//! Keeps two kinds of read position over one immutable log:
//!
//! * a **global cursor** (`last_global_id`) that walks every entry in
//!   recording order, whatever its key;
//! * a **keyed cursor** per key that walks only that key's entries.
//!
//! The cursors never move each other.  A keyed read may optionally be *gated*
//! by the global cursor: it then only returns entries whose id is also past
//! the global position.
//!
//! ```text
//! log:     a#1  b#2  a#3
//! global:  ^ get_next_replay() -> a#1
//! key "b":      ^ get_next_key_replay("b", false) -> b#2 (global stays at 1)
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rewind_types::Entry;

use crate::error::ReplayError;
use crate::store::{EntryStore, Mode};

/// Cursor-based reader over a replay log.
pub struct Player {
    store: EntryStore,
    last_global_id: i64,
    last_id_by_key: HashMap<String, i64>,
}

impl Player {
    /// Open the existing log at `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        Ok(Self::from_store(EntryStore::open(path, Mode::Read)?))
    }

    /// Replay an already opened store from the beginning.
    pub fn from_store(store: EntryStore) -> Self {
        Self {
            store,
            last_global_id: 0,
            last_id_by_key: HashMap::new(),
        }
    }

    /// Next entry in global order, advancing the global cursor.
    ///
    /// Returns `Ok(None)` once the log is exhausted, and keeps doing so.
    pub fn get_next_replay(&mut self) -> Result<Option<Entry>, ReplayError> {
        let next = match self.store.next_after(self.last_global_id) {
            Ok(next) => next,
            Err(e) => {
                // Step past an undecodable row so later entries stay reachable.
                if let Some(id) = e.entry_id() {
                    self.last_global_id = id;
                }
                return Err(e);
            }
        };
        if let Some(entry) = &next {
            self.last_global_id = entry.id;
        }
        Ok(next)
    }

    /// Next entry for `key`, advancing only that key's cursor.
    ///
    /// With `follow_global` the entry must also lie past the global cursor,
    /// i.e. "the next entry for this key the global reader has not passed".
    pub fn get_next_key_replay(
        &mut self,
        key: &str,
        follow_global: bool,
    ) -> Result<Option<Entry>, ReplayError> {
        let mut after = self.last_id_by_key.get(key).copied().unwrap_or(0);
        if follow_global {
            after = after.max(self.last_global_id);
        }
        let next = match self.store.next_after_for_key(key, after) {
            Ok(next) => next,
            Err(e) => {
                if let Some(id) = e.entry_id() {
                    self.last_id_by_key.insert(key.to_string(), id);
                }
                return Err(e);
            }
        };
        if let Some(entry) = &next {
            self.last_id_by_key.insert(key.to_string(), entry.id);
        }
        Ok(next)
    }

    /// Id of the last entry returned by the global cursor (0 before any read).
    pub fn last_global_id(&self) -> i64 {
        self.last_global_id
    }

    /// Id of the last entry returned for `key` (0 before any read).
    pub fn last_id_for_key(&self, key: &str) -> i64 {
        self.last_id_by_key.get(key).copied().unwrap_or(0)
    }

    /// Every key in the log with its entry count.
    pub fn key_counts(&self) -> Result<Vec<(String, u64)>, ReplayError> {
        self.store.key_counts()
    }

    /// First and last recorded timestamps.
    pub fn time_span(&self) -> Result<Option<(f64, f64)>, ReplayError> {
        self.store.time_span()
    }

    /// Total number of entries.
    pub fn len(&self) -> Result<u64, ReplayError> {
        self.store.len()
    }

    /// `true` when the log holds no entries.
    pub fn is_empty(&self) -> Result<bool, ReplayError> {
        self.store.is_empty()
    }

    /// File backing this player.
    pub fn path(&self) -> Option<&Path> {
        self.store.path()
    }

    /// Release the log file.
    pub fn close(self) -> Result<(), ReplayError> {
        self.store.close()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ReplaySource
// ─────────────────────────────────────────────────────────────────────────────

/// A thread-safe handle onto a player's cursors.
///
/// The replay shim pulls from one of these on its dispatch thread while other
/// code may issue keyed reads against the same cursors.  Implemented for a
/// locked [`Player`], for the process-wide
/// [`SessionSlot`][crate::session::SessionSlot], and for shared references to
/// either.
pub trait ReplaySource: Send + Sync {
    /// See [`Player::get_next_replay`].
    fn next_replay(&self) -> Result<Option<Entry>, ReplayError>;

    /// See [`Player::get_next_key_replay`].
    fn next_key_replay(&self, key: &str, follow_global: bool)
    -> Result<Option<Entry>, ReplayError>;
}

impl ReplaySource for Mutex<Player> {
    fn next_replay(&self) -> Result<Option<Entry>, ReplayError> {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_next_replay()
    }

    fn next_key_replay(
        &self,
        key: &str,
        follow_global: bool,
    ) -> Result<Option<Entry>, ReplayError> {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_next_key_replay(key, follow_global)
    }
}

impl<T: ReplaySource + ?Sized> ReplaySource for Arc<T> {
    fn next_replay(&self) -> Result<Option<Entry>, ReplayError> {
        (**self).next_replay()
    }

    fn next_key_replay(
        &self,
        key: &str,
        follow_global: bool,
    ) -> Result<Option<Entry>, ReplayError> {
        (**self).next_key_replay(key, follow_global)
    }
}

impl<T: ReplaySource + ?Sized> ReplaySource for &T {
    fn next_replay(&self) -> Result<Option<Entry>, ReplayError> {
        (**self).next_replay()
    }

    fn next_key_replay(
        &self,
        key: &str,
        follow_global: bool,
    ) -> Result<Option<Entry>, ReplayError> {
        (**self).next_key_replay(key, follow_global)
    }
}

//! In-memory status store published to connected hosts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One tracked work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Store-assigned identifier, unique for the helper's lifetime.
    pub id: i64,
    /// Caller-supplied display name.
    pub name: String,
    /// Coarse lifecycle label (`pending` until the first progress update).
    pub status: String,
    /// Completion fraction in `[0, 1)`.
    pub progress: f64,
}

/// Mutable set of status entries with change tracking.
///
/// The store marks itself dirty on every mutation; the publish loop drains
/// the flag with [`StatusStore::take_dirty`] and broadcasts a snapshot, so
/// idle stores generate no traffic.
#[derive(Debug, Default)]
pub struct StatusStore {
    entries: HashMap<i64, StatusEntry>,
    next_id: i64,
    dirty: bool,
}

impl StatusStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store tracks no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds an entry and returns its id.
    pub fn add_item(&mut self, name: &str) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert(
            id,
            StatusEntry {
                id,
                name: name.to_string(),
                status: "pending".to_string(),
                progress: 0.0,
            },
        );
        self.dirty = true;
        id
    }

    /// Removes an entry. Returns false for unknown ids.
    pub fn delete_item(&mut self, id: i64) -> bool {
        let removed = self.entries.remove(&id).is_some();
        self.dirty |= removed;
        removed
    }

    /// Re-rolls every entry's progress, moving them to `running`.
    pub fn randomize_progress(&mut self) {
        for entry in self.entries.values_mut() {
            entry.progress = rand::random::<f64>();
            entry.status = "running".to_string();
        }
        self.dirty |= !self.entries.is_empty();
    }

    /// All entries ordered by id.
    pub fn snapshot(&self) -> Vec<StatusEntry> {
        let mut entries: Vec<StatusEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    /// Clears and returns the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

//! Linear undo/redo history of full-tree snapshots.
//!
//! Each entry holds the state as it was after the operation that produced
//! it, so undo loads the entry below the top and redo reloads the entry it
//! removed. Writes made during a mutation are buffered as [`FieldChange`]s
//! and folded into the next entry; an open update group defers that fold
//! until the group closes, collapsing all of its mutations into one entry.

use crate::error::HistoryOp;
use crate::{Path, StoreConfig, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Store construction or re-initialization.
    Init,
    /// A single committed mutation.
    Mutation,
    /// A closed update group, possibly spanning many mutations.
    BatchedMutation,
}

/// One write recorded while a mutation was running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Path of the container that was written.
    pub path: Path,
    /// The written field (object key or array index).
    pub field: String,
    /// The whole container as it was before the write.
    pub previous: Value,
}

/// A snapshot on the history stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: EntryKind,
    /// Full materialized state after the operation.
    pub snapshot: Value,
    /// Writes folded into this entry, in the order they happened.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
    /// For update groups: the structural diff nested at the group's path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Value>,
    /// Mutation key or update-group label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl HistoryEntry {
    fn new(kind: EntryKind, snapshot: Value) -> Self {
        Self {
            kind,
            snapshot,
            changes: Vec::new(),
            diff: None,
            source: None,
        }
    }
}

/// Subtree copy taken when an update group opens.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    pub(crate) path: Path,
    pub(crate) value: Value,
}

#[derive(Debug)]
pub(crate) struct History {
    entries: Vec<HistoryEntry>,
    future: Vec<HistoryEntry>,
    batch: Vec<FieldChange>,
    checkpoint: Option<Checkpoint>,
    limit: Option<usize>,
    clear_redo_on_commit: bool,
}

impl History {
    pub(crate) fn new(config: &StoreConfig) -> Self {
        Self {
            entries: Vec::new(),
            future: Vec::new(),
            batch: Vec::new(),
            checkpoint: None,
            limit: config.history_limit.map(|n| n.max(1)),
            clear_redo_on_commit: config.clear_redo_on_commit,
        }
    }

    /// Drop everything and start over from `snapshot`.
    pub(crate) fn reset(&mut self, snapshot: Value) {
        self.entries.clear();
        self.future.clear();
        self.batch.clear();
        self.checkpoint = None;
        self.entries.push(HistoryEntry::new(EntryKind::Init, snapshot));
    }

    pub(crate) fn record(&mut self, change: FieldChange) {
        self.batch.push(change);
    }

    pub(crate) fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// Open an update group. Returns the path of a group this one replaced.
    pub(crate) fn begin(&mut self, path: Path, value: Value) -> Option<Path> {
        self.checkpoint
            .replace(Checkpoint { path, value })
            .map(|previous| previous.path)
    }

    pub(crate) fn take_checkpoint(&mut self) -> Option<Checkpoint> {
        self.checkpoint.take()
    }

    /// Fold the pending writes of a finished mutation into a new entry.
    pub(crate) fn commit_batch(&mut self, snapshot: Value, source: &str) {
        let mut entry = HistoryEntry::new(EntryKind::Mutation, snapshot);
        entry.changes = std::mem::take(&mut self.batch);
        entry.source = Some(source.to_owned());
        self.push(entry);
    }

    /// Fold a closed update group into a single entry.
    pub(crate) fn commit_group(&mut self, snapshot: Value, diff: Option<Value>, source: String) {
        let mut entry = HistoryEntry::new(EntryKind::BatchedMutation, snapshot);
        entry.changes = std::mem::take(&mut self.batch);
        entry.diff = diff;
        entry.source = Some(source);
        self.push(entry);
    }

    fn push(&mut self, entry: HistoryEntry) {
        if self.clear_redo_on_commit {
            self.future.clear();
        }
        self.entries.push(entry);
        self.prune();
    }

    /// Drop the oldest entries beyond the configured limit.
    fn prune(&mut self) {
        if let Some(limit) = self.limit {
            if self.entries.len() > limit {
                let excess = self.entries.len() - limit;
                self.entries.drain(..excess);
            }
        }
    }

    /// State an undo would load. Nothing moves until [`undo`](Self::undo).
    pub(crate) fn undo_target(&self) -> StoreResult<Value> {
        self.entries
            .len()
            .checked_sub(2)
            .and_then(|below_top| self.entries.get(below_top))
            .map(|entry| entry.snapshot.clone())
            .ok_or(StoreError::HistoryUnderflow {
                operation: HistoryOp::Undo,
            })
    }

    /// Move the top entry to the future stack.
    pub(crate) fn undo(&mut self) {
        if self.entries.len() < 2 {
            return;
        }
        if let Some(top) = self.entries.pop() {
            self.future.push(top);
        }
    }

    /// State a redo would load. Nothing moves until [`redo`](Self::redo).
    pub(crate) fn redo_target(&self) -> StoreResult<Value> {
        self.future
            .last()
            .map(|entry| entry.snapshot.clone())
            .ok_or(StoreError::HistoryUnderflow {
                operation: HistoryOp::Redo,
            })
    }

    /// Restore the most recently undone entry.
    pub(crate) fn redo(&mut self) {
        if let Some(entry) = self.future.pop() {
            self.entries.push(entry);
            self.prune();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn future_len(&self) -> usize {
        self.future.len()
    }

    #[cfg(test)]
    pub(crate) fn pending_changes(&self) -> usize {
        self.batch.len()
    }

    pub(crate) fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}

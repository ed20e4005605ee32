//! Undo history for file operations.
//!
//! Every executed plan leaves an [`UndoRecord`]: the primitive effects it
//! had on disk, in execution order. Undo replays their inverses in reverse
//! order, redo replays them forward. Before touching anything, both check
//! the whole record against the current filesystem so that a record made
//! stale by outside changes is rejected instead of half-applied.

use std::collections::HashMap;

use caravan_core::{FileRef, FsError, RedoError, UndoError};
use caravan_vfs::transfer::{copy_tree, relocate, remove_tree};
use caravan_vfs::{FileSystem, FsResult};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::operation::OperationKind;
use crate::watch::{ChangeFeed, FileChange};

/// One primitive effect of an executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoAction {
    CreatedDirectory { location: FileRef },
    CreatedFile { location: FileRef },
    Copied { original: FileRef, copy: FileRef },
    Moved { from: FileRef, to: FileRef },
    /// A source directory emptied by a move was removed.
    RemovedDirectory { location: FileRef },
    Trashed { original: FileRef, trash: FileRef },
    Restored { trash: FileRef, original: FileRef },
    Linked { target: FileRef, link: FileRef },
    /// An existing entry was replaced by an overwrite. Nothing to invert.
    Replaced { location: FileRef },
    /// Permanently deleted. Cannot be inverted.
    Deleted { location: FileRef },
}

impl UndoAction {
    /// Where the entry was before the step ran.
    pub fn original_location(&self) -> Option<&FileRef> {
        match self {
            Self::Copied { original, .. } | Self::Trashed { original, .. } => Some(original),
            Self::Moved { from, .. } => Some(from),
            Self::Restored { trash, .. } => Some(trash),
            Self::Linked { target, .. } => Some(target),
            Self::RemovedDirectory { location }
            | Self::Replaced { location }
            | Self::Deleted { location } => Some(location),
            Self::CreatedDirectory { .. } | Self::CreatedFile { .. } => None,
        }
    }

    /// Where the step put the entry.
    pub fn new_location(&self) -> Option<&FileRef> {
        match self {
            Self::CreatedDirectory { location } | Self::CreatedFile { location } => Some(location),
            Self::Copied { copy, .. } => Some(copy),
            Self::Moved { to, .. } => Some(to),
            Self::Trashed { trash, .. } => Some(trash),
            Self::Restored { original, .. } => Some(original),
            Self::Linked { link, .. } => Some(link),
            Self::RemovedDirectory { .. } | Self::Replaced { .. } | Self::Deleted { .. } => None,
        }
    }

    pub fn is_reversible(&self) -> bool {
        !matches!(self, Self::Deleted { .. })
    }
}

/// Effects of one operation, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoRecord {
    /// Assigned when the record enters the history.
    pub id: u64,
    pub kind: OperationKind,
    pub actions: Vec<UndoAction>,
    /// Human-readable description.
    pub description: String,
    pub timestamp: DateTime<Local>,
}

impl UndoRecord {
    pub fn new(kind: OperationKind, description: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind,
            actions: Vec::new(),
            description: description.into(),
            timestamp: Local::now(),
        }
    }

    pub fn push(&mut self, action: UndoAction) {
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Check if this record can be undone at all.
    pub fn can_undo(&self) -> bool {
        !self.actions.is_empty() && self.actions.iter().all(UndoAction::is_reversible)
    }

    /// Get a description of how to undo this operation.
    pub fn undo_description(&self) -> String {
        if !self.can_undo() {
            return "Cannot undo permanent deletion".to_string();
        }
        let count = |f: fn(&UndoAction) -> bool| self.actions.iter().filter(|a| f(a)).count();
        match self.kind {
            OperationKind::Copy => {
                let copies = count(|a| matches!(a, UndoAction::Copied { .. }));
                format!("Delete {copies} copied items")
            }
            OperationKind::Move => {
                let moves = count(|a| matches!(a, UndoAction::Moved { .. } | UndoAction::Copied { .. }));
                format!("Move {moves} items back to original location")
            }
            OperationKind::Trash => {
                let trashed = count(|a| matches!(a, UndoAction::Trashed { .. }));
                format!("Restore {trashed} items from trash")
            }
            OperationKind::Restore => {
                let restored = count(|a| matches!(a, UndoAction::Restored { .. }));
                format!("Move {restored} items back to trash")
            }
            OperationKind::Rename => match self.actions.first() {
                Some(UndoAction::Moved { from, .. }) => {
                    format!("Rename back to '{}'", from.name_lossy())
                }
                _ => "Rename back".to_string(),
            },
            OperationKind::Link => {
                let links = count(|a| matches!(a, UndoAction::Linked { .. }));
                format!("Delete {links} links")
            }
            OperationKind::CreateFile => "Delete the created file".to_string(),
            OperationKind::CreateDirectory => "Delete the created directory".to_string(),
            OperationKind::Delete => "Cannot undo permanent deletion".to_string(),
        }
    }
}

/// Position of a history entry relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum EntryState {
    Applied,
    Undone,
    Redone,
}

/// What an undo or redo call acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryStep {
    pub id: u64,
    pub kind: OperationKind,
    pub description: String,
}

impl HistoryStep {
    fn of(record: &UndoRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            description: record.description.clone(),
        }
    }
}

#[derive(Debug)]
struct HistoryEntry {
    record: UndoRecord,
    state: EntryState,
}

/// Linear undo/redo history with a bounded depth.
///
/// Entries before the cursor are applied (undoable); entries from the
/// cursor on are undone (redoable). Pushing a new record drops the redo
/// tail.
#[derive(Debug)]
pub struct UndoManager {
    entries: Vec<HistoryEntry>,
    cursor: usize,
    max_entries: usize,
    next_id: u64,
    /// Bumped whenever entries are pushed or cleared.
    revision: u64,
    buffer_size: usize,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(100)
    }
}

impl UndoManager {
    /// Create a new history with the specified maximum entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_entries.min(1000)),
            cursor: 0,
            max_entries: max_entries.max(1),
            next_id: 1,
            revision: 0,
            buffer_size: 64 * 1024,
        }
    }

    /// Buffer size used when an inversion has to copy across devices.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Add a record at the cursor, discarding anything redoable.
    ///
    /// Returns the ID assigned to the record.
    pub fn push(&mut self, mut record: UndoRecord) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        record.id = id;

        self.revision += 1;
        self.entries.truncate(self.cursor);
        if self.entries.len() >= self.max_entries {
            self.entries.remove(0);
        }
        self.entries.push(HistoryEntry {
            record,
            state: EntryState::Applied,
        });
        self.cursor = self.entries.len();
        id
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// The record the next undo would act on.
    pub fn peek_undo(&self) -> Option<&UndoRecord> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|e| &e.record)
    }

    /// The record the next redo would act on.
    pub fn peek_redo(&self) -> Option<&UndoRecord> {
        self.entries.get(self.cursor).map(|e| &e.record)
    }

    pub fn state_of(&self, id: u64) -> Option<EntryState> {
        self.entries
            .iter()
            .find(|e| e.record.id == id)
            .map(|e| e.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.revision += 1;
        self.entries.clear();
        self.cursor = 0;
    }

    /// Records from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (&UndoRecord, EntryState)> {
        self.entries.iter().map(|e| (&e.record, e.state))
    }

    /// Invert the most recent applied record.
    ///
    /// A record that cannot be undone, or that no longer matches the
    /// filesystem, is dropped from the history and the error says why.
    pub fn undo(
        &mut self,
        fs: &dyn FileSystem,
        feed: Option<&ChangeFeed>,
    ) -> Result<HistoryStep, UndoError> {
        let mut checkout = self.checkout_undo()?;
        checkout.apply_undo(fs, feed)?;
        Ok(self.check_in(checkout, EntryState::Undone))
    }

    /// Re-apply the most recently undone record.
    pub fn redo(
        &mut self,
        fs: &dyn FileSystem,
        feed: Option<&ChangeFeed>,
    ) -> Result<HistoryStep, RedoError> {
        let mut checkout = self.checkout_redo()?;
        checkout.apply_redo(fs, feed)?;
        Ok(self.check_in(checkout, EntryState::Redone))
    }

    /// Take the newest applied record out of the history for inversion.
    ///
    /// Records that can never be undone are dropped here.
    pub(crate) fn checkout_undo(&mut self) -> Result<Checkout, UndoError> {
        let index = self.cursor.checked_sub(1).ok_or(UndoError::NothingToUndo)?;
        if !self.entries[index].record.can_undo() {
            let entry = self.discard(index);
            return Err(UndoError::NotUndoable {
                description: entry.record.description,
            });
        }
        Ok(self.checkout(index))
    }

    /// Take the oldest undone record out of the history for replay.
    pub(crate) fn checkout_redo(&mut self) -> Result<Checkout, RedoError> {
        if self.cursor >= self.entries.len() {
            return Err(RedoError::NothingToRedo);
        }
        Ok(self.checkout(self.cursor))
    }

    /// Put a record back at the cursor after a successful undo or redo.
    ///
    /// If the history was pushed to or cleared while the record was out,
    /// the record is dropped like any other redo tail.
    pub(crate) fn check_in(&mut self, checkout: Checkout, state: EntryState) -> HistoryStep {
        let step = HistoryStep::of(&checkout.record);
        if checkout.revision != self.revision {
            warn!(id = step.id, ?state, "history changed meanwhile, record dropped");
            return step;
        }
        self.entries.insert(
            self.cursor,
            HistoryEntry {
                record: checkout.record,
                state,
            },
        );
        if state == EntryState::Redone {
            self.cursor += 1;
        }
        step
    }

    fn checkout(&mut self, index: usize) -> Checkout {
        let entry = self.entries.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }
        Checkout {
            record: entry.record,
            revision: self.revision,
            buffer_size: self.buffer_size,
        }
    }

    fn discard(&mut self, index: usize) -> HistoryEntry {
        let entry = self.entries.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }
        debug!(id = entry.record.id, "dropped from history");
        entry
    }
}

/// A record taken out of the history while its actions run, so that the
/// history lock is not held across filesystem calls.
///
/// A checkout that fails is never checked back in, which drops the record.
#[derive(Debug)]
pub(crate) struct Checkout {
    record: UndoRecord,
    revision: u64,
    buffer_size: usize,
}

impl Checkout {
    /// Validate, then apply the inverse of every action, newest first.
    pub(crate) fn apply_undo(
        &mut self,
        fs: &dyn FileSystem,
        feed: Option<&ChangeFeed>,
    ) -> Result<(), UndoError> {
        let record = &mut self.record;
        let mut overlay = Overlay::new(fs);
        if let Err(stale) = record
            .actions
            .iter()
            .rev()
            .try_for_each(|action| overlay.check_inverse(action))
        {
            warn!(id = record.id, location = %stale.location, reason = %stale.reason, "undo record is stale");
            return Err(UndoError::Stale {
                location: stale.location,
                reason: stale.reason,
            });
        }

        let buffer_size = self.buffer_size;
        let applied = record
            .actions
            .iter_mut()
            .rev()
            .try_for_each(|action| invert(action, fs, buffer_size, feed));
        if let Err(e) = applied {
            warn!(id = record.id, error = %e, "undo failed part way");
            return Err(e.into());
        }
        info!(id = record.id, kind = %record.kind, "undone");
        Ok(())
    }

    /// Validate, then re-apply every action in execution order.
    pub(crate) fn apply_redo(
        &mut self,
        fs: &dyn FileSystem,
        feed: Option<&ChangeFeed>,
    ) -> Result<(), RedoError> {
        let record = &mut self.record;
        let mut overlay = Overlay::new(fs);
        if let Err(stale) = record
            .actions
            .iter()
            .try_for_each(|action| overlay.check_forward(action))
        {
            warn!(id = record.id, location = %stale.location, reason = %stale.reason, "redo record is stale");
            return Err(RedoError::Stale {
                location: stale.location,
                reason: stale.reason,
            });
        }

        let buffer_size = self.buffer_size;
        let applied = record
            .actions
            .iter_mut()
            .try_for_each(|action| replay(action, fs, buffer_size, feed));
        if let Err(e) = applied {
            warn!(id = record.id, error = %e, "redo failed part way");
            return Err(e.into());
        }
        info!(id = record.id, kind = %record.kind, "redone");
        Ok(())
    }
}

struct Staleness {
    location: FileRef,
    reason: String,
}

impl Staleness {
    fn new(location: &FileRef, reason: &str) -> Self {
        Self {
            location: location.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Simulated filesystem state while validating a record.
struct Overlay<'a> {
    fs: &'a dyn FileSystem,
    states: HashMap<FileRef, bool>,
}

impl<'a> Overlay<'a> {
    fn new(fs: &'a dyn FileSystem) -> Self {
        Self {
            fs,
            states: HashMap::new(),
        }
    }

    fn exists(&self, location: &FileRef) -> bool {
        if let Some(&present) = self.states.get(location) {
            return present;
        }
        let mut ancestor = location.parent();
        while let Some(dir) = ancestor {
            if self.states.get(&dir) == Some(&false) {
                return false;
            }
            ancestor = dir.parent();
        }
        self.fs.exists(location)
    }

    fn set(&mut self, location: &FileRef, present: bool) {
        self.states.insert(location.clone(), present);
    }

    fn present(&self, location: &FileRef) -> Result<(), Staleness> {
        if self.exists(location) {
            Ok(())
        } else {
            Err(Staleness::new(location, "no longer exists"))
        }
    }

    fn absent(&self, location: &FileRef) -> Result<(), Staleness> {
        if self.exists(location) {
            Err(Staleness::new(location, "is occupied"))
        } else {
            Ok(())
        }
    }

    fn parent_present(&self, location: &FileRef) -> Result<(), Staleness> {
        match location.parent() {
            Some(parent) if !self.exists(&parent) => {
                Err(Staleness::new(&parent, "parent directory no longer exists"))
            }
            _ => Ok(()),
        }
    }

    /// Every child on disk must already be accounted for by the record.
    fn emptied(&self, location: &FileRef) -> Result<(), Staleness> {
        let children = self.fs.list_children(location).unwrap_or_default();
        match children.iter().find(|child| self.exists(child)) {
            Some(child) => Err(Staleness::new(child, "was added since the operation")),
            None => Ok(()),
        }
    }

    fn check_inverse(&mut self, action: &UndoAction) -> Result<(), Staleness> {
        match action {
            UndoAction::CreatedDirectory { location } => {
                self.present(location)?;
                self.emptied(location)?;
                self.set(location, false);
            }
            UndoAction::CreatedFile { location }
            | UndoAction::Copied { copy: location, .. }
            | UndoAction::Linked { link: location, .. }
            | UndoAction::Restored {
                original: location,
                ..
            } => {
                self.present(location)?;
                self.set(location, false);
            }
            UndoAction::Moved { from, to } => {
                self.present(to)?;
                self.absent(from)?;
                self.parent_present(from)?;
                self.set(to, false);
                self.set(from, true);
            }
            UndoAction::RemovedDirectory { location } => {
                self.absent(location)?;
                self.parent_present(location)?;
                self.set(location, true);
            }
            UndoAction::Trashed { original, trash } => {
                self.present(trash)?;
                self.absent(original)?;
                self.set(trash, false);
                self.set(original, true);
            }
            UndoAction::Replaced { .. } => {}
            UndoAction::Deleted { location } => {
                return Err(Staleness::new(location, "was permanently deleted"));
            }
        }
        Ok(())
    }

    fn check_forward(&mut self, action: &UndoAction) -> Result<(), Staleness> {
        match action {
            UndoAction::CreatedDirectory { location }
            | UndoAction::CreatedFile { location }
            | UndoAction::Linked { link: location, .. } => {
                self.absent(location)?;
                self.parent_present(location)?;
                self.set(location, true);
            }
            UndoAction::Copied { original, copy } => {
                self.present(original)?;
                self.absent(copy)?;
                self.parent_present(copy)?;
                self.set(copy, true);
            }
            UndoAction::Moved { from, to } => {
                self.present(from)?;
                self.absent(to)?;
                self.parent_present(to)?;
                self.set(from, false);
                self.set(to, true);
            }
            UndoAction::RemovedDirectory { location } => {
                self.present(location)?;
                self.emptied(location)?;
                self.set(location, false);
            }
            UndoAction::Trashed { original, .. } => {
                self.present(original)?;
                self.set(original, false);
            }
            UndoAction::Restored { trash, original } => {
                self.present(trash)?;
                self.absent(original)?;
                self.set(trash, false);
                self.set(original, true);
            }
            UndoAction::Replaced { .. } => {}
            UndoAction::Deleted { location } => {
                return Err(Staleness::new(location, "was permanently deleted"));
            }
        }
        Ok(())
    }
}

fn invert(
    action: &mut UndoAction,
    fs: &dyn FileSystem,
    buffer_size: usize,
    feed: Option<&ChangeFeed>,
) -> FsResult<()> {
    let change = match action {
        UndoAction::CreatedDirectory { location }
        | UndoAction::CreatedFile { location }
        | UndoAction::Linked { link: location, .. } => {
            fs.delete(location)?;
            Some(FileChange::Removed(location.clone()))
        }
        UndoAction::Copied { copy, .. } => {
            remove_tree(fs, copy)?;
            Some(FileChange::Removed(copy.clone()))
        }
        UndoAction::Moved { from, to } => {
            relocate(fs, to, from, buffer_size)?;
            Some(FileChange::Moved {
                from: to.clone(),
                to: from.clone(),
            })
        }
        UndoAction::RemovedDirectory { location } => {
            fs.create_directory(location)?;
            Some(FileChange::Created(location.clone()))
        }
        UndoAction::Trashed { trash, .. } => {
            let original = fs.restore_from_trash(trash)?;
            Some(FileChange::Restored {
                trash: trash.clone(),
                original,
            })
        }
        UndoAction::Restored { trash, original } => {
            *trash = fs.move_to_trash(original)?;
            Some(FileChange::Trashed {
                original: original.clone(),
                trash: trash.clone(),
            })
        }
        UndoAction::Replaced { .. } => None,
        UndoAction::Deleted { location } => {
            return Err(FsError::unsupported(
                location.clone(),
                "permanent deletion cannot be undone",
            ));
        }
    };
    if let (Some(feed), Some(change)) = (feed, change) {
        feed.publish(change);
    }
    Ok(())
}

fn replay(
    action: &mut UndoAction,
    fs: &dyn FileSystem,
    buffer_size: usize,
    feed: Option<&ChangeFeed>,
) -> FsResult<()> {
    let change = match action {
        UndoAction::CreatedDirectory { location } => {
            fs.create_directory(location)?;
            Some(FileChange::Created(location.clone()))
        }
        UndoAction::CreatedFile { location } => {
            drop(fs.open_write(location, false)?);
            Some(FileChange::Created(location.clone()))
        }
        UndoAction::Linked { target, link } => {
            fs.create_symlink(target.path(), link)?;
            Some(FileChange::Created(link.clone()))
        }
        UndoAction::Copied { original, copy } => {
            copy_tree(fs, original, copy, buffer_size)?;
            Some(FileChange::Created(copy.clone()))
        }
        UndoAction::Moved { from, to } => {
            relocate(fs, from, to, buffer_size)?;
            Some(FileChange::Moved {
                from: from.clone(),
                to: to.clone(),
            })
        }
        UndoAction::RemovedDirectory { location } => {
            fs.delete(location)?;
            Some(FileChange::Removed(location.clone()))
        }
        UndoAction::Trashed { original, trash } => {
            *trash = fs.move_to_trash(original)?;
            Some(FileChange::Trashed {
                original: original.clone(),
                trash: trash.clone(),
            })
        }
        UndoAction::Restored { trash, .. } => {
            let original = fs.restore_from_trash(trash)?;
            Some(FileChange::Restored {
                trash: trash.clone(),
                original,
            })
        }
        UndoAction::Replaced { .. } => None,
        UndoAction::Deleted { location } => {
            return Err(FsError::unsupported(
                location.clone(),
                "permanent deletion cannot be replayed",
            ));
        }
    };
    if let (Some(feed), Some(change)) = (feed, change) {
        feed.publish(change);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravan_vfs::LocalFs;

    fn record(kind: OperationKind, path: &str) -> UndoRecord {
        let mut record = UndoRecord::new(kind, format!("{kind} {path}"));
        record.push(UndoAction::CreatedFile {
            location: FileRef::local(path),
        });
        record
    }

    #[test]
    fn test_push_truncates_redo_tail() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::with_staging_trash(dir.path().join(".trash"));
        let file = dir.path().join("a");
        std::fs::write(&file, b"").unwrap();

        let mut history = UndoManager::new(10);
        history.push(record(OperationKind::CreateFile, file.to_str().unwrap()));
        history.undo(&fs, None).unwrap();
        assert!(history.can_redo());

        history.push(record(OperationKind::CreateFile, "/elsewhere"));
        assert!(!history.can_redo());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_checked_out_record_returns_to_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::with_staging_trash(dir.path().join(".trash"));
        let file = dir.path().join("a");
        std::fs::write(&file, b"").unwrap();

        let mut history = UndoManager::new(10);
        let id = history.push(record(OperationKind::CreateFile, file.to_str().unwrap()));
        let mut checkout = history.checkout_undo().unwrap();
        assert!(!history.can_undo());

        checkout.apply_undo(&fs, None).unwrap();
        history.check_in(checkout, EntryState::Undone);

        assert!(!file.exists());
        assert!(history.can_redo());
        assert_eq!(history.state_of(id), Some(EntryState::Undone));
    }

    #[test]
    fn test_push_while_checked_out_drops_record() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::with_staging_trash(dir.path().join(".trash"));
        let file = dir.path().join("a");
        std::fs::write(&file, b"").unwrap();

        let mut history = UndoManager::new(10);
        history.push(record(OperationKind::CreateFile, file.to_str().unwrap()));
        let mut checkout = history.checkout_undo().unwrap();
        history.push(record(OperationKind::CreateFile, "/elsewhere"));

        checkout.apply_undo(&fs, None).unwrap();
        let step = history.check_in(checkout, EntryState::Undone);

        assert_eq!(step.kind, OperationKind::CreateFile);
        assert!(!history.can_redo());
        assert_eq!(history.len(), 1);
        assert_eq!(
            history.peek_undo().unwrap().description,
            "Create file /elsewhere"
        );
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut history = UndoManager::new(3);
        for i in 0..5 {
            history.push(record(OperationKind::CreateFile, &format!("/f{i}")));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.peek_undo().unwrap().description, "Create file /f4");
        let oldest = history.iter().next().unwrap().0;
        assert_eq!(oldest.description, "Create file /f2");
    }

    #[test]
    fn test_nothing_to_undo_or_redo() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::with_staging_trash(dir.path().join(".trash"));
        let mut history = UndoManager::default();
        assert!(matches!(history.undo(&fs, None), Err(UndoError::NothingToUndo)));
        assert!(matches!(history.redo(&fs, None), Err(RedoError::NothingToRedo)));
    }

    #[test]
    fn test_permanent_delete_is_not_undoable() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::with_staging_trash(dir.path().join(".trash"));
        let mut history = UndoManager::default();
        let mut deleted = UndoRecord::new(OperationKind::Delete, "Deleted 1 items");
        deleted.push(UndoAction::Deleted {
            location: FileRef::local("/gone"),
        });
        assert_eq!(deleted.undo_description(), "Cannot undo permanent deletion");
        history.push(deleted);

        assert!(matches!(
            history.undo(&fs, None),
            Err(UndoError::NotUndoable { .. })
        ));
        assert!(history.is_empty());
    }

    #[test]
    fn test_undo_description() {
        let mut moved = UndoRecord::new(OperationKind::Rename, "Renamed");
        moved.push(UndoAction::Moved {
            from: FileRef::local("/d/old.txt"),
            to: FileRef::local("/d/new.txt"),
        });
        assert_eq!(moved.undo_description(), "Rename back to 'old.txt'");
    }

    #[test]
    fn test_action_locations() {
        let action = UndoAction::Trashed {
            original: FileRef::local("/a"),
            trash: FileRef::parse("trash:///a"),
        };
        assert_eq!(action.original_location(), Some(&FileRef::local("/a")));
        assert_eq!(action.new_location(), Some(&FileRef::parse("trash:///a")));
        assert!(action.is_reversible());
    }
}

//! Planning: turning an operation into an ordered list of steps.
//!
//! Nothing is mutated while planning. Conflicts are settled here, so the
//! executor only ever runs steps whose destinations have been decided.

use std::collections::HashMap;
use std::ffi::OsStr;

use caravan_core::{
    DIRECTORY_WEIGHT, EngineConfig, EntryKind, FileRef, FsError, Metadata, PlanError,
};
use caravan_vfs::FileSystem;
use serde::Serialize;
use tracing::{debug, warn};

use crate::conflict::{Conflict, ConflictDecision, ConflictResolver};
use crate::naming::validate_filename;
use crate::operation::OperationKind;

/// Whether sources survive a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum TransferMode {
    Copy,
    Move,
}

/// Primitive action performed by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum StepKind {
    MakeDirectory,
    CopyFile,
    MoveFile,
    DeleteEntry,
    SetMetadata,
    TrashEntry,
    RestoreEntry,
    CreateLink,
    CreateFile,
}

/// Hints attached to a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepFlags {
    /// Source and destination share a volume; try a rename first.
    pub atomic_rename: bool,
    /// Truncate an existing destination file instead of creating one.
    pub overwrite: bool,
    /// Removes a source directory emptied by a move.
    pub cleanup: bool,
    /// Removes an existing entry that an overwrite replaces.
    pub replaces: bool,
}

/// One primitive action of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferStep {
    pub kind: StepKind,
    pub source: Option<FileRef>,
    pub destination: FileRef,
    /// Weighted byte count used for progress.
    pub size_hint: u64,
    pub flags: StepFlags,
}

impl TransferStep {
    fn new(kind: StepKind, source: Option<FileRef>, destination: FileRef, size_hint: u64) -> Self {
        Self {
            kind,
            source,
            destination,
            size_hint,
            flags: StepFlags::default(),
        }
    }

    fn with_flags(mut self, flags: StepFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The entry the user thinks of as being processed.
    pub fn current_item(&self) -> &FileRef {
        self.source.as_ref().unwrap_or(&self.destination)
    }
}

/// Ordered steps for one operation.
///
/// A directory's creation always precedes its contents; removal of a
/// source directory always follows everything moved out of it.
#[derive(Debug, Clone, Serialize)]
pub struct TransferPlan {
    pub operation: OperationKind,
    /// Top-level entries, deduplicated.
    pub sources: Vec<FileRef>,
    pub steps: Vec<TransferStep>,
    /// Entries dropped while planning (conflict skips, no-op moves).
    pub skipped: Vec<FileRef>,
    pub total_bytes: u64,
}

impl TransferPlan {
    fn new(operation: OperationKind, sources: Vec<FileRef>) -> Self {
        Self {
            operation,
            sources,
            steps: Vec::new(),
            skipped: Vec::new(),
            total_bytes: 0,
        }
    }

    fn push(&mut self, step: TransferStep) {
        self.total_bytes += step.size_hint;
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builds plans against a backend.
///
/// A planner carries the conflict session of one operation: an "apply to
/// all" answer holds for every later conflict it meets.
pub struct Planner<'a> {
    fs: &'a dyn FileSystem,
    config: &'a EngineConfig,
    resolver: ConflictResolver,
    /// Destinations already produced by earlier steps of the plan.
    claimed: HashMap<FileRef, EntryKind>,
}

impl<'a> Planner<'a> {
    pub fn new(fs: &'a dyn FileSystem, config: &'a EngineConfig, resolver: ConflictResolver) -> Self {
        Self {
            fs,
            config,
            resolver,
            claimed: HashMap::new(),
        }
    }

    /// Plan a copy or move of `sources` into `destination`.
    pub fn plan(
        &mut self,
        sources: &[FileRef],
        destination: &FileRef,
        mode: TransferMode,
    ) -> Result<TransferPlan, PlanError> {
        self.require_directory(destination)?;
        let sources = top_level(sources);

        for source in &sources {
            if destination.is_within(source) {
                return Err(PlanError::RecursiveMove {
                    location: source.clone(),
                    destination: destination.clone(),
                });
            }
        }

        let operation = match mode {
            TransferMode::Copy => OperationKind::Copy,
            TransferMode::Move => OperationKind::Move,
        };
        let mut plan = TransferPlan::new(operation, sources.clone());

        for source in &sources {
            let meta = self.stat_source(source)?;
            let mut target = destination.child(entry_name(source)?);

            if target == *source {
                match mode {
                    TransferMode::Move => {
                        debug!(source = %source, "already in destination, nothing to move");
                        plan.skipped.push(source.clone());
                        continue;
                    }
                    TransferMode::Copy => {
                        target = self.duplicate_target(source, meta.is_dir())?;
                    }
                }
            }

            self.plan_entry(source, &meta, target, mode, &mut plan)?;
        }

        debug!(
            operation = %plan.operation,
            steps = plan.len(),
            skipped = plan.skipped.len(),
            bytes = plan.total_bytes,
            "plan ready"
        );
        Ok(plan)
    }

    /// Plan a permanent delete, deepest entries first.
    pub fn plan_delete(&mut self, targets: &[FileRef]) -> Result<TransferPlan, PlanError> {
        let targets = top_level(targets);
        let mut plan = TransferPlan::new(OperationKind::Delete, targets.clone());
        for target in &targets {
            let meta = self.stat_source(target)?;
            self.push_removal(target, meta.kind, StepFlags::default(), &mut plan)?;
        }
        Ok(plan)
    }

    /// Plan moving `targets` to the trash, one step per top-level entry.
    pub fn plan_trash(&mut self, targets: &[FileRef]) -> Result<TransferPlan, PlanError> {
        let targets = top_level(targets);
        let mut plan = TransferPlan::new(OperationKind::Trash, targets.clone());
        for target in &targets {
            let meta = self.stat_source(target)?;
            plan.push(TransferStep::new(
                StepKind::TrashEntry,
                Some(target.clone()),
                target.clone(),
                meta.weight(),
            ));
        }
        Ok(plan)
    }

    /// Plan restoring trashed entries to their original locations.
    ///
    /// Entries whose original location is occupied are skipped.
    pub fn plan_restore(&mut self, trash_refs: &[FileRef]) -> Result<TransferPlan, PlanError> {
        let trash_refs = top_level(trash_refs);
        let mut plan = TransferPlan::new(OperationKind::Restore, trash_refs.clone());
        for trash_ref in &trash_refs {
            let meta = self.stat_source(trash_ref)?;
            let origin = self.fs.trash_origin(trash_ref)?;
            if self.occupant(&origin)?.is_some() {
                warn!(trash = %trash_ref, original = %origin, "original location is occupied, not restoring");
                plan.skipped.push(trash_ref.clone());
                continue;
            }
            self.claimed.insert(origin.clone(), meta.kind);
            plan.push(TransferStep::new(
                StepKind::RestoreEntry,
                Some(trash_ref.clone()),
                origin,
                meta.weight(),
            ));
        }
        Ok(plan)
    }

    /// Plan renaming `source` in place.
    pub fn plan_rename(&mut self, source: &FileRef, new_name: &str) -> Result<TransferPlan, PlanError> {
        validate_filename(new_name).map_err(|reason| PlanError::InvalidName {
            name: new_name.to_string(),
            reason,
        })?;
        let meta = self.stat_source(source)?;
        let target = source.with_name(new_name);
        let mut plan = TransferPlan::new(OperationKind::Rename, vec![source.clone()]);

        if target == *source {
            plan.skipped.push(source.clone());
            return Ok(plan);
        }
        if self.occupant(&target)?.is_some() {
            return Err(FsError::AlreadyExists { location: target }.into());
        }

        plan.push(
            TransferStep::new(StepKind::MoveFile, Some(source.clone()), target, meta.weight())
                .with_flags(StepFlags {
                    atomic_rename: true,
                    ..StepFlags::default()
                }),
        );
        Ok(plan)
    }

    /// Plan symbolic links to `targets` inside `destination`.
    pub fn plan_link(
        &mut self,
        targets: &[FileRef],
        destination: &FileRef,
    ) -> Result<TransferPlan, PlanError> {
        self.require_directory(destination)?;
        let targets = top_level(targets);
        let mut plan = TransferPlan::new(OperationKind::Link, targets.clone());

        for target in &targets {
            self.stat_source(target)?;
            let mut link = destination.child(entry_name(target)?);
            if link == *target {
                link = target.with_name(format!("Link to {}", target.name_lossy()));
            }

            if let Some((existing_kind, claimed)) = self.occupant(&link)? {
                let conflict =
                    Conflict::new(target.clone(), link.clone(), EntryKind::Symlink, existing_kind);
                match self.decide(&conflict)? {
                    ConflictDecision::Cancel => return Err(PlanError::Cancelled),
                    ConflictDecision::Rename(name) => link = link.with_name(name),
                    ConflictDecision::Overwrite | ConflictDecision::OverwriteAll if !claimed => {
                        self.push_removal(&link, existing_kind, replaces(), &mut plan)?;
                    }
                    _ => {
                        plan.skipped.push(target.clone());
                        continue;
                    }
                }
            }

            self.claimed.insert(link.clone(), EntryKind::Symlink);
            plan.push(TransferStep::new(
                StepKind::CreateLink,
                Some(target.clone()),
                link,
                0,
            ));
        }
        Ok(plan)
    }

    /// Plan creating an empty file or directory at `location`.
    pub fn plan_create(&mut self, location: &FileRef, directory: bool) -> Result<TransferPlan, PlanError> {
        let name = location.name_lossy();
        validate_filename(&name).map_err(|reason| PlanError::InvalidName {
            name: name.clone(),
            reason,
        })?;
        let parent = location.parent().ok_or_else(|| PlanError::InvalidDestination {
            location: location.clone(),
        })?;
        self.require_directory(&parent)?;
        if self.occupant(location)?.is_some() {
            return Err(FsError::AlreadyExists {
                location: location.clone(),
            }
            .into());
        }

        let (operation, kind, weight) = if directory {
            (OperationKind::CreateDirectory, StepKind::MakeDirectory, DIRECTORY_WEIGHT)
        } else {
            (OperationKind::CreateFile, StepKind::CreateFile, 0)
        };
        let mut plan = TransferPlan::new(operation, vec![location.clone()]);
        plan.push(TransferStep::new(kind, None, location.clone(), weight));
        Ok(plan)
    }

    /// Plan one entry whose destination may be occupied.
    ///
    /// Returns whether the entry and all its descendants got steps.
    fn plan_entry(
        &mut self,
        source: &FileRef,
        meta: &Metadata,
        target: FileRef,
        mode: TransferMode,
        plan: &mut TransferPlan,
    ) -> Result<bool, PlanError> {
        let Some((existing_kind, claimed)) = self.occupant(&target)? else {
            return self.emit(source, meta, target, mode, plan);
        };

        let conflict = Conflict::new(source.clone(), target.clone(), meta.kind, existing_kind);
        match self.decide(&conflict)? {
            ConflictDecision::Skip | ConflictDecision::SkipAll => {
                debug!(source = %source, destination = %target, "skipping conflicting entry");
                plan.skipped.push(source.clone());
                Ok(false)
            }
            ConflictDecision::Cancel => Err(PlanError::Cancelled),
            ConflictDecision::Rename(name) => {
                let renamed = target.with_name(name);
                self.emit(source, meta, renamed, mode, plan)
            }
            ConflictDecision::Merge => self.merge(source, &target, mode, plan),
            ConflictDecision::Overwrite | ConflictDecision::OverwriteAll => {
                if claimed {
                    warn!(source = %source, destination = %target, "destination written earlier in this operation, skipping");
                    plan.skipped.push(source.clone());
                    return Ok(false);
                }
                if source.is_descendant_of(&target) {
                    return Err(PlanError::RecursiveMove {
                        location: source.clone(),
                        destination: target,
                    });
                }
                self.overwrite(source, meta, target, existing_kind, mode, plan)
            }
        }
    }

    fn overwrite(
        &mut self,
        source: &FileRef,
        meta: &Metadata,
        target: FileRef,
        existing_kind: EntryKind,
        mode: TransferMode,
        plan: &mut TransferPlan,
    ) -> Result<bool, PlanError> {
        if mode == TransferMode::Copy
            && meta.kind == EntryKind::File
            && existing_kind == EntryKind::File
        {
            self.claimed.insert(target.clone(), meta.kind);
            plan.push(
                TransferStep::new(StepKind::CopyFile, Some(source.clone()), target, meta.len)
                    .with_flags(StepFlags {
                        overwrite: true,
                        ..StepFlags::default()
                    }),
            );
            return Ok(true);
        }

        self.push_removal(&target, existing_kind, replaces(), plan)?;
        self.emit(source, meta, target, mode, plan)
    }

    /// Emit steps for an entry whose destination is free.
    fn emit(
        &mut self,
        source: &FileRef,
        meta: &Metadata,
        target: FileRef,
        mode: TransferMode,
        plan: &mut TransferPlan,
    ) -> Result<bool, PlanError> {
        self.claimed.insert(target.clone(), meta.kind);
        let atomic = mode == TransferMode::Move && self.same_volume(source, &target);
        let flags = StepFlags {
            atomic_rename: atomic,
            ..StepFlags::default()
        };

        if !meta.is_dir() {
            let kind = match mode {
                TransferMode::Copy => StepKind::CopyFile,
                TransferMode::Move => StepKind::MoveFile,
            };
            plan.push(TransferStep::new(kind, Some(source.clone()), target, meta.len).with_flags(flags));
            return Ok(true);
        }

        if atomic {
            let weight = self.subtree_weight(source, meta)?;
            plan.push(
                TransferStep::new(StepKind::MoveFile, Some(source.clone()), target, weight)
                    .with_flags(flags),
            );
            return Ok(true);
        }

        plan.push(TransferStep::new(
            StepKind::MakeDirectory,
            Some(source.clone()),
            target.clone(),
            DIRECTORY_WEIGHT,
        ));

        let mut complete = true;
        for child in self.fs.list_children(source)? {
            let Some(child_meta) = self.stat_child(&child)? else {
                continue;
            };
            let child_target = target.child(entry_name(&child)?);
            complete &= self.emit(&child, &child_meta, child_target, mode, plan)?;
        }

        if self.config.preserve_metadata {
            plan.push(TransferStep::new(
                StepKind::SetMetadata,
                Some(source.clone()),
                target,
                0,
            ));
        }
        self.finish_source_directory(source, mode, complete, plan);
        Ok(complete)
    }

    /// Transfer the children of `source` into the existing directory `target`.
    fn merge(
        &mut self,
        source: &FileRef,
        target: &FileRef,
        mode: TransferMode,
        plan: &mut TransferPlan,
    ) -> Result<bool, PlanError> {
        debug!(source = %source, destination = %target, "merging into existing directory");
        let mut complete = true;
        for child in self.fs.list_children(source)? {
            let Some(child_meta) = self.stat_child(&child)? else {
                continue;
            };
            let child_target = target.child(entry_name(&child)?);
            complete &= self.plan_entry(&child, &child_meta, child_target, mode, plan)?;
        }
        self.finish_source_directory(source, mode, complete, plan);
        Ok(complete)
    }

    fn finish_source_directory(
        &self,
        source: &FileRef,
        mode: TransferMode,
        complete: bool,
        plan: &mut TransferPlan,
    ) {
        if mode != TransferMode::Move {
            return;
        }
        if complete {
            plan.push(
                TransferStep::new(StepKind::DeleteEntry, None, source.clone(), 0).with_flags(
                    StepFlags {
                        cleanup: true,
                        ..StepFlags::default()
                    },
                ),
            );
        } else {
            debug!(source = %source, "keeping source directory, some entries stay behind");
        }
    }

    /// Delete steps for `location` and everything below it, post-order.
    fn push_removal(
        &mut self,
        location: &FileRef,
        kind: EntryKind,
        flags: StepFlags,
        plan: &mut TransferPlan,
    ) -> Result<(), PlanError> {
        if kind.is_dir() {
            for child in self.fs.list_children(location)? {
                let Some(child_meta) = self.stat_child(&child)? else {
                    continue;
                };
                self.push_removal(&child, child_meta.kind, flags, plan)?;
            }
        }
        plan.push(TransferStep::new(StepKind::DeleteEntry, None, location.clone(), 0).with_flags(flags));
        Ok(())
    }

    fn decide(&mut self, conflict: &Conflict) -> Result<ConflictDecision, PlanError> {
        let fs = self.fs;
        let claimed = &self.claimed;
        let is_taken = |location: &FileRef| claimed.contains_key(location) || fs.exists(location);
        self.resolver.resolve(conflict, &is_taken)
    }

    fn duplicate_target(&self, source: &FileRef, is_dir: bool) -> Result<FileRef, PlanError> {
        let fs = self.fs;
        let claimed = &self.claimed;
        let is_taken = |location: &FileRef| claimed.contains_key(location) || fs.exists(location);
        self.resolver.duplicate(source, is_dir, &is_taken)
    }

    /// What occupies `location`, and whether this plan put it there.
    fn occupant(&self, location: &FileRef) -> Result<Option<(EntryKind, bool)>, PlanError> {
        if let Some(kind) = self.claimed.get(location) {
            return Ok(Some((*kind, true)));
        }
        match self.fs.stat(location) {
            Ok(meta) => Ok(Some((meta.kind, false))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn require_directory(&self, location: &FileRef) -> Result<(), PlanError> {
        match self.fs.stat(location) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(PlanError::InvalidDestination {
                location: location.clone(),
            }),
            Err(e) if e.is_not_found() => Err(PlanError::InvalidDestination {
                location: location.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn stat_source(&self, source: &FileRef) -> Result<Metadata, PlanError> {
        self.fs.stat(source).map_err(|e| {
            if e.is_not_found() {
                PlanError::SourceVanished {
                    location: source.clone(),
                }
            } else {
                e.into()
            }
        })
    }

    /// Stat an enumerated child; `None` if it vanished since listing.
    fn stat_child(&self, child: &FileRef) -> Result<Option<Metadata>, PlanError> {
        match self.fs.stat(child) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.is_not_found() => {
                debug!(location = %child, "entry vanished while planning");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn same_volume(&self, source: &FileRef, target: &FileRef) -> bool {
        target
            .parent()
            .is_some_and(|parent| self.fs.same_volume(source, &parent))
    }

    fn subtree_weight(&self, location: &FileRef, meta: &Metadata) -> Result<u64, PlanError> {
        let mut weight = meta.weight();
        if meta.is_dir() {
            for child in self.fs.list_children(location)? {
                if let Some(child_meta) = self.stat_child(&child)? {
                    weight += self.subtree_weight(&child, &child_meta)?;
                }
            }
        }
        Ok(weight)
    }
}

impl std::fmt::Debug for Planner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("resolver", &self.resolver)
            .field("claimed", &self.claimed.len())
            .finish_non_exhaustive()
    }
}

fn replaces() -> StepFlags {
    StepFlags {
        replaces: true,
        ..StepFlags::default()
    }
}

fn entry_name(location: &FileRef) -> Result<&OsStr, PlanError> {
    location
        .path()
        .file_name()
        .ok_or_else(|| PlanError::InvalidName {
            name: location.to_string(),
            reason: "a filesystem root has no name".into(),
        })
}

/// Deduplicate `sources` and drop entries already covered by an ancestor.
fn top_level(sources: &[FileRef]) -> Vec<FileRef> {
    let mut kept: Vec<FileRef> = Vec::with_capacity(sources.len());
    for source in sources {
        if kept.iter().any(|k| source.is_within(k)) {
            continue;
        }
        kept.retain(|k| !k.is_descendant_of(source));
        kept.push(source.clone());
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_drops_duplicates_and_nested() {
        let sources = [
            FileRef::local("/a/b"),
            FileRef::local("/a"),
            FileRef::local("/c"),
            FileRef::local("/c"),
            FileRef::local("/cd"),
        ];
        assert_eq!(
            top_level(&sources),
            vec![FileRef::local("/a"), FileRef::local("/c"), FileRef::local("/cd")]
        );
    }

    #[test]
    fn test_entry_name_of_root() {
        assert!(entry_name(&FileRef::local("/")).is_err());
        assert_eq!(entry_name(&FileRef::local("/x/y")).unwrap(), "y");
    }
}

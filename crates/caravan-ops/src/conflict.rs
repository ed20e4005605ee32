//! Conflict detection and resolution for file operations.

use caravan_core::{ConflictPolicy, EngineConfig, EntryKind, FileRef, PlanError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::naming::{duplicate_name, numbered_name, validate_filename};

/// A destination collision found while planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The entry being transferred.
    pub source: FileRef,
    /// The occupied destination.
    pub destination: FileRef,
    /// Kind of the entry being transferred.
    pub source_kind: EntryKind,
    /// Kind of the entry already at the destination.
    pub existing_kind: EntryKind,
}

impl Conflict {
    /// Create a new conflict.
    pub fn new(
        source: FileRef,
        destination: FileRef,
        source_kind: EntryKind,
        existing_kind: EntryKind,
    ) -> Self {
        Self {
            source,
            destination,
            source_kind,
            existing_kind,
        }
    }

    /// Both sides are directories, so the trees can be merged.
    pub fn is_directory_pair(&self) -> bool {
        self.source_kind.is_dir() && self.existing_kind.is_dir()
    }
}

/// How a single conflict is settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictDecision {
    /// Leave the existing entry and drop this one.
    Skip,
    /// Skip this and every remaining file conflict.
    SkipAll,
    /// Replace the existing entry.
    Overwrite,
    /// Replace this and every remaining file conflict.
    OverwriteAll,
    /// Transfer under a different name in the same directory.
    Rename(String),
    /// Recurse into the existing directory.
    Merge,
    /// Abort the whole operation before anything runs.
    Cancel,
}

impl ConflictDecision {
    /// Check if this decision applies to all remaining conflicts.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::SkipAll | Self::OverwriteAll | Self::Cancel)
    }

    /// Convert a global decision to its single-item equivalent.
    pub fn to_single(&self) -> Self {
        match self {
            Self::SkipAll => Self::Skip,
            Self::OverwriteAll => Self::Overwrite,
            other => other.clone(),
        }
    }
}

/// Interactive source of conflict decisions, e.g. a dialog.
///
/// `suggested_name` is the first free `"name (n)"` variant, when one exists.
pub trait ConflictHandler: Send {
    fn decide(&mut self, conflict: &Conflict, suggested_name: Option<&str>) -> ConflictDecision;
}

impl<F> ConflictHandler for F
where
    F: FnMut(&Conflict, Option<&str>) -> ConflictDecision + Send,
{
    fn decide(&mut self, conflict: &Conflict, suggested_name: Option<&str>) -> ConflictDecision {
        self(conflict, suggested_name)
    }
}

/// Settles destination collisions for one operation.
///
/// Batch policies short-circuit without any callback. An "all" answer from
/// the handler becomes the policy for the rest of the operation.
pub struct ConflictResolver {
    policy: ConflictPolicy,
    strict: bool,
    max_probes: u32,
    handler: Option<Box<dyn ConflictHandler>>,
    session: Option<ConflictDecision>,
}

impl ConflictResolver {
    pub fn new(policy: ConflictPolicy, strict: bool, max_probes: u32) -> Self {
        Self {
            policy,
            strict,
            max_probes: max_probes.max(1),
            handler: None,
            session: None,
        }
    }

    /// Resolver with the configured policy, strictness and probe bound.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.conflict_policy,
            config.strict_directory_conflicts,
            config.max_rename_probes,
        )
    }

    pub fn with_handler(mut self, handler: Option<Box<dyn ConflictHandler>>) -> Self {
        self.handler = handler;
        self
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Decide what to do about `conflict`.
    ///
    /// `is_taken` reports whether a candidate location is occupied, on disk
    /// or by an earlier step of the same plan. The returned decision is
    /// always a single-item one: never `SkipAll` or `OverwriteAll`.
    pub fn resolve(
        &mut self,
        conflict: &Conflict,
        is_taken: &dyn Fn(&FileRef) -> bool,
    ) -> Result<ConflictDecision, PlanError> {
        if conflict.is_directory_pair() {
            if !self.strict {
                return Ok(ConflictDecision::Merge);
            }
            return self
                .probe(&conflict.destination, true, is_taken)
                .map(ConflictDecision::Rename);
        }

        if let Some(decision) = &self.session {
            return Ok(decision.clone());
        }

        let source_is_dir = conflict.source_kind.is_dir();
        match self.policy {
            ConflictPolicy::Skip => Ok(ConflictDecision::Skip),
            ConflictPolicy::Overwrite => Ok(ConflictDecision::Overwrite),
            ConflictPolicy::Rename => self
                .probe(&conflict.destination, source_is_dir, is_taken)
                .map(ConflictDecision::Rename),
            ConflictPolicy::Ask => self.ask(conflict, is_taken),
        }
    }

    fn ask(
        &mut self,
        conflict: &Conflict,
        is_taken: &dyn Fn(&FileRef) -> bool,
    ) -> Result<ConflictDecision, PlanError> {
        let source_is_dir = conflict.source_kind.is_dir();
        let suggestion = self
            .probe(&conflict.destination, source_is_dir, is_taken)
            .ok();
        let handler = self
            .handler
            .as_mut()
            .ok_or_else(|| PlanError::ConflictUnresolved {
                location: conflict.destination.clone(),
            })?;

        let decision = handler.decide(conflict, suggestion.as_deref());
        debug!(destination = %conflict.destination, ?decision, "conflict answered");

        match decision {
            ConflictDecision::SkipAll | ConflictDecision::OverwriteAll => {
                let single = decision.to_single();
                self.session = Some(single.clone());
                Ok(single)
            }
            ConflictDecision::Rename(name) => {
                validate_filename(&name).map_err(|reason| PlanError::InvalidName {
                    name: name.clone(),
                    reason,
                })?;
                if is_taken(&conflict.destination.with_name(&name)) {
                    let taken = conflict.destination.with_name(&name);
                    return self
                        .probe(&taken, source_is_dir, is_taken)
                        .map(ConflictDecision::Rename);
                }
                Ok(ConflictDecision::Rename(name))
            }
            ConflictDecision::Merge => Err(PlanError::ConflictUnresolved {
                location: conflict.destination.clone(),
            }),
            other => Ok(other),
        }
    }

    /// First free `"name (n)"` sibling of `destination`.
    pub fn probe(
        &self,
        destination: &FileRef,
        is_dir: bool,
        is_taken: &dyn Fn(&FileRef) -> bool,
    ) -> Result<String, PlanError> {
        let name = destination.name_lossy();
        for n in 1..=self.max_probes {
            let candidate = numbered_name(&name, n, is_dir);
            if !is_taken(&destination.with_name(&candidate)) {
                return Ok(candidate);
            }
        }
        Err(PlanError::RenameProbesExhausted {
            location: destination.clone(),
            probes: self.max_probes,
        })
    }

    /// First free "(Copy)" sibling of `original`, for copies placed next to it.
    pub fn duplicate(
        &self,
        original: &FileRef,
        is_dir: bool,
        is_taken: &dyn Fn(&FileRef) -> bool,
    ) -> Result<FileRef, PlanError> {
        let mut name = original.name_lossy();
        for _ in 0..self.max_probes {
            name = duplicate_name(&name, is_dir);
            let candidate = original.with_name(&name);
            if !is_taken(&candidate) {
                return Ok(candidate);
            }
        }
        Err(PlanError::RenameProbesExhausted {
            location: original.clone(),
            probes: self.max_probes,
        })
    }
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("policy", &self.policy)
            .field("strict", &self.strict)
            .field("max_probes", &self.max_probes)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

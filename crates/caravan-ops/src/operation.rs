//! File operation types.

use caravan_core::{ConflictPolicy, FileRef};
use serde::{Deserialize, Serialize};

use crate::conflict::ConflictHandler;
use crate::executor::FailurePolicy;

/// The kind of operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
    Trash,
    Restore,
    Rename,
    Link,
    #[strum(to_string = "Create file")]
    CreateFile,
    #[strum(to_string = "Create directory")]
    CreateDirectory,
}

impl OperationKind {
    /// Verb used in summaries ("Moved 3 items").
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Copy => "Copied",
            Self::Move => "Moved",
            Self::Delete => "Deleted",
            Self::Trash => "Trashed",
            Self::Restore => "Restored",
            Self::Rename => "Renamed",
            Self::Link => "Linked",
            Self::CreateFile | Self::CreateDirectory => "Created",
        }
    }
}

/// A file operation to be executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FileOperation {
    /// Copy files/directories into a destination directory.
    Copy {
        sources: Vec<FileRef>,
        destination: FileRef,
    },
    /// Move files/directories into a destination directory.
    Move {
        sources: Vec<FileRef>,
        destination: FileRef,
    },
    /// Permanently delete files/directories.
    Delete { targets: Vec<FileRef> },
    /// Move files/directories to the trash.
    Trash { targets: Vec<FileRef> },
    /// Put trashed entries back where they came from.
    Restore { trash_refs: Vec<FileRef> },
    /// Rename a single file or directory.
    Rename { source: FileRef, new_name: String },
    /// Create symbolic links to `targets` inside `destination`.
    Link {
        targets: Vec<FileRef>,
        destination: FileRef,
    },
    /// Create a new empty file.
    CreateFile { location: FileRef },
    /// Create a new directory.
    CreateDirectory { location: FileRef },
}

impl FileOperation {
    /// Create a copy operation.
    pub fn copy(sources: Vec<FileRef>, destination: FileRef) -> Self {
        Self::Copy {
            sources,
            destination,
        }
    }

    /// Create a move operation.
    pub fn move_to(sources: Vec<FileRef>, destination: FileRef) -> Self {
        Self::Move {
            sources,
            destination,
        }
    }

    /// Create a permanent delete operation.
    pub fn delete(targets: Vec<FileRef>) -> Self {
        Self::Delete { targets }
    }

    /// Create a trash operation.
    pub fn trash(targets: Vec<FileRef>) -> Self {
        Self::Trash { targets }
    }

    /// Create a restore operation.
    pub fn restore(trash_refs: Vec<FileRef>) -> Self {
        Self::Restore { trash_refs }
    }

    /// Create a rename operation.
    pub fn rename(source: FileRef, new_name: impl Into<String>) -> Self {
        Self::Rename {
            source,
            new_name: new_name.into(),
        }
    }

    /// Create a link operation.
    pub fn link(targets: Vec<FileRef>, destination: FileRef) -> Self {
        Self::Link {
            targets,
            destination,
        }
    }

    /// Create a file creation operation.
    pub fn create_file(location: FileRef) -> Self {
        Self::CreateFile { location }
    }

    /// Create a directory creation operation.
    pub fn create_directory(location: FileRef) -> Self {
        Self::CreateDirectory { location }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Copy { .. } => OperationKind::Copy,
            Self::Move { .. } => OperationKind::Move,
            Self::Delete { .. } => OperationKind::Delete,
            Self::Trash { .. } => OperationKind::Trash,
            Self::Restore { .. } => OperationKind::Restore,
            Self::Rename { .. } => OperationKind::Rename,
            Self::Link { .. } => OperationKind::Link,
            Self::CreateFile { .. } => OperationKind::CreateFile,
            Self::CreateDirectory { .. } => OperationKind::CreateDirectory,
        }
    }
}

/// Per-invocation overrides of the engine configuration.
#[derive(Default)]
pub struct OperationOptions {
    /// Conflict policy; the configured default when `None`.
    pub conflict_policy: Option<ConflictPolicy>,
    /// Rename directory collisions instead of merging them.
    pub strict_directory_conflicts: Option<bool>,
    /// Abort or continue after a failed step; chosen from the plan when `None`.
    pub failure_policy: Option<FailurePolicy>,
    /// Asked for file conflicts under [`ConflictPolicy::Ask`].
    pub conflict_handler: Option<Box<dyn ConflictHandler>>,
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = Some(policy);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    pub fn with_handler(mut self, handler: impl ConflictHandler + 'static) -> Self {
        self.conflict_handler = Some(Box::new(handler));
        self
    }

    /// Rename instead of merging when a directory lands on a directory.
    pub fn strict(mut self) -> Self {
        self.strict_directory_conflicts = Some(true);
        self
    }
}

impl std::fmt::Debug for OperationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationOptions")
            .field("conflict_policy", &self.conflict_policy)
            .field("strict_directory_conflicts", &self.strict_directory_conflicts)
            .field("failure_policy", &self.failure_policy)
            .field("conflict_handler", &self.conflict_handler.is_some())
            .finish()
    }
}

//! Error types for planning, executing and reverting file operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::FileRef;

/// Classified error from a filesystem backend call.
#[derive(Debug, Error)]
pub enum FsError {
    /// Entry does not exist.
    #[error("Not found: {location}")]
    NotFound { location: FileRef },

    /// Entry already exists.
    #[error("Already exists: {location}")]
    AlreadyExists { location: FileRef },

    /// Permission denied (includes read-only filesystems).
    #[error("Permission denied: {location}")]
    PermissionDenied { location: FileRef },

    /// The target volume is full.
    #[error("Not enough space to write {location}")]
    NotEnoughSpace { location: FileRef },

    /// A directory was required.
    #[error("Not a directory: {location}")]
    NotADirectory { location: FileRef },

    /// A non-directory was required.
    #[error("Is a directory: {location}")]
    IsADirectory { location: FileRef },

    /// Directory still has children.
    #[error("Directory not empty: {location}")]
    DirectoryNotEmpty { location: FileRef },

    /// Rename would cross a filesystem boundary.
    #[error("Cannot rename across filesystems: {location}")]
    CrossesDevices { location: FileRef },

    /// Interrupted or temporarily unavailable; worth an immediate retry.
    #[error("Temporary I/O error at {location}: {source}")]
    Transient {
        location: FileRef,
        #[source]
        source: std::io::Error,
    },

    /// The backend cannot handle this location or request.
    #[error("Unsupported operation on {location}: {message}")]
    Unsupported { location: FileRef, message: String },

    /// Trash backend failure.
    #[error("Trash error for {location}: {message}")]
    Trash { location: FileRef, message: String },

    /// Any other I/O error.
    #[error("I/O error at {location}: {source}")]
    Io {
        location: FileRef,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// Classify an I/O error with location context.
    pub fn io(location: impl Into<FileRef>, source: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        let location = location.into();
        match source.kind() {
            Io::NotFound => Self::NotFound { location },
            Io::AlreadyExists => Self::AlreadyExists { location },
            Io::PermissionDenied | Io::ReadOnlyFilesystem => Self::PermissionDenied { location },
            Io::StorageFull | Io::QuotaExceeded => Self::NotEnoughSpace { location },
            Io::NotADirectory => Self::NotADirectory { location },
            Io::IsADirectory => Self::IsADirectory { location },
            Io::DirectoryNotEmpty => Self::DirectoryNotEmpty { location },
            Io::CrossesDevices => Self::CrossesDevices { location },
            Io::Interrupted | Io::WouldBlock | Io::TimedOut | Io::ResourceBusy => {
                Self::Transient { location, source }
            }
            Io::Unsupported => Self::Unsupported {
                location,
                message: source.to_string(),
            },
            _ => Self::Io { location, source },
        }
    }

    /// Create a not-found error.
    pub fn not_found(location: impl Into<FileRef>) -> Self {
        Self::NotFound {
            location: location.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(location: impl Into<FileRef>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            location: location.into(),
            message: message.into(),
        }
    }

    /// The location the error refers to.
    pub fn location(&self) -> &FileRef {
        match self {
            Self::NotFound { location }
            | Self::AlreadyExists { location }
            | Self::PermissionDenied { location }
            | Self::NotEnoughSpace { location }
            | Self::NotADirectory { location }
            | Self::IsADirectory { location }
            | Self::DirectoryNotEmpty { location }
            | Self::CrossesDevices { location }
            | Self::Transient { location, .. }
            | Self::Unsupported { location, .. }
            | Self::Trash { location, .. }
            | Self::Io { location, .. } => location,
        }
    }

    /// Check whether an immediate retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Serialisable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NotEnoughSpace { .. } => ErrorKind::NotEnoughSpace,
            Self::NotADirectory { .. } => ErrorKind::NotADirectory,
            Self::IsADirectory { .. } => ErrorKind::IsADirectory,
            Self::DirectoryNotEmpty { .. } => ErrorKind::DirectoryNotEmpty,
            Self::CrossesDevices { .. } => ErrorKind::CrossesDevices,
            Self::Transient { .. } => ErrorKind::TransientIo,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Trash { .. } => ErrorKind::Trash,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Classification attached to failed steps and partial outcomes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[strum(to_string = "Permission denied")]
    PermissionDenied,
    #[strum(to_string = "Not enough space")]
    NotEnoughSpace,
    #[strum(to_string = "Source vanished during the operation")]
    SourceVanished,
    #[strum(to_string = "Temporary I/O error")]
    TransientIo,
    #[strum(to_string = "Already exists")]
    AlreadyExists,
    #[strum(to_string = "Not found")]
    NotFound,
    #[strum(to_string = "Not a directory")]
    NotADirectory,
    #[strum(to_string = "Is a directory")]
    IsADirectory,
    #[strum(to_string = "Directory not empty")]
    DirectoryNotEmpty,
    #[strum(to_string = "Crosses filesystems")]
    CrossesDevices,
    #[strum(to_string = "Copied, but original not removed")]
    CrossFilesystemFallbackPartial,
    #[strum(to_string = "Unsupported")]
    Unsupported,
    #[strum(to_string = "Trash error")]
    Trash,
    #[strum(to_string = "I/O error")]
    Io,
}

/// Errors raised while building a transfer plan. No mutation has happened.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Destination is missing or not a directory.
    #[error("Invalid destination: {location}")]
    InvalidDestination { location: FileRef },

    /// A directory would be moved or copied into itself.
    #[error("Cannot move {location} into its own descendant {destination}")]
    RecursiveMove {
        location: FileRef,
        destination: FileRef,
    },

    /// A source disappeared before it could be planned.
    #[error("Source vanished: {location}")]
    SourceVanished { location: FileRef },

    /// Interactive resolution needed but no handler is available.
    #[error("Conflict at {location} needs a decision but none can be asked for")]
    ConflictUnresolved { location: FileRef },

    /// No free "name (n)" variant was found.
    #[error("No free name found for {location} after {probes} attempts")]
    RenameProbesExhausted { location: FileRef, probes: u32 },

    /// A requested name is not a valid file name.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// The user chose to cancel while resolving a conflict.
    #[error("Operation cancelled")]
    Cancelled,

    /// Backend failure while inspecting the tree.
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Errors raised by undo.
#[derive(Debug, Error)]
pub enum UndoError {
    #[error("Nothing to undo")]
    NothingToUndo,

    /// The most recent record cannot be reversed (e.g. permanent deletion).
    #[error("Cannot undo: {description}")]
    NotUndoable { description: String },

    /// A referenced location changed since the operation ran.
    #[error("Cannot undo, {location} changed: {reason}")]
    Stale { location: FileRef, reason: String },

    /// Backend failure during inversion.
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Errors raised by redo.
#[derive(Debug, Error)]
pub enum RedoError {
    #[error("Nothing to redo")]
    NothingToRedo,

    /// A referenced location changed since the operation was undone.
    #[error("Cannot redo, {location} changed: {reason}")]
    Stale { location: FileRef, reason: String },

    /// Backend failure during replay.
    #[error(transparent)]
    Fs(#[from] FsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_io_classification() {
        let err = FsError::io(
            FileRef::local("/test/path"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, FsError::PermissionDenied { .. }));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err = FsError::io(
            FileRef::local("/test/path"),
            std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr"),
        );
        assert!(err.is_transient());
        assert_eq!(err.location(), &FileRef::local("/test/path"));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(
            ErrorKind::CrossFilesystemFallbackPartial.to_string(),
            "Copied, but original not removed"
        );
    }
}

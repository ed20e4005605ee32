//! Filesystem access layer for caravan.
//!
//! The engine never touches `std::fs` directly. Every stat, enumeration and
//! mutation goes through the [`FileSystem`] trait so that backends (the local
//! disk, trash staging areas, test doubles) can be swapped without changing
//! planning or execution.

mod local;
mod trashcan;
pub mod transfer;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use caravan_core::{FileRef, FsError, Metadata};

pub use local::LocalFs;
pub use trashcan::{StagingTrash, TrashBackend};

#[cfg(any(
    windows,
    all(unix, not(target_os = "macos"), not(target_os = "ios"), not(target_os = "android"))
))]
pub use trashcan::SystemTrash;

/// Result type for backend calls.
pub type FsResult<T> = Result<T, FsError>;

/// Contract between the engine and a storage backend.
///
/// All calls may block. None of them follow symlinks, and none of them
/// replace an existing entry unless explicitly asked to (`open_write` with
/// `truncate`).
pub trait FileSystem: Send + Sync {
    /// Metadata of an entry, `FsError::NotFound` if it does not exist.
    fn stat(&self, location: &FileRef) -> FsResult<Metadata>;

    /// Direct children of a directory, sorted by name.
    fn list_children(&self, location: &FileRef) -> FsResult<Vec<FileRef>>;

    /// Create a single directory. The parent must exist.
    fn create_directory(&self, location: &FileRef) -> FsResult<()>;

    fn open_read(&self, location: &FileRef) -> FsResult<Box<dyn Read + Send>>;

    /// Open for writing. Without `truncate` the entry must not exist yet.
    fn open_write(&self, location: &FileRef, truncate: bool) -> FsResult<Box<dyn Write + Send>>;

    /// Rename within one volume. Fails if `to` exists or the rename would
    /// cross devices.
    fn rename(&self, from: &FileRef, to: &FileRef) -> FsResult<()>;

    /// Delete a file, a symlink or an empty directory.
    fn delete(&self, location: &FileRef) -> FsResult<()>;

    /// Move an entry into the trash, returning its trash reference.
    fn move_to_trash(&self, location: &FileRef) -> FsResult<FileRef>;

    /// Put a trashed entry back, returning the location it was restored to.
    fn restore_from_trash(&self, trash_ref: &FileRef) -> FsResult<FileRef>;

    /// Where a trashed entry would be restored to.
    fn trash_origin(&self, trash_ref: &FileRef) -> FsResult<FileRef>;

    /// Apply timestamps and permissions from `metadata`, best-effort.
    fn set_metadata(&self, location: &FileRef, metadata: &Metadata) -> FsResult<()>;

    fn read_link(&self, location: &FileRef) -> FsResult<PathBuf>;

    fn create_symlink(&self, target: &Path, link: &FileRef) -> FsResult<()>;

    /// Check whether an entry exists. Always queries the backend.
    fn exists(&self, location: &FileRef) -> bool {
        self.stat(location).is_ok()
    }

    /// Check whether two existing entries live on the same volume.
    fn same_volume(&self, a: &FileRef, b: &FileRef) -> bool {
        match (self.stat(a), self.stat(b)) {
            (Ok(a), Ok(b)) => a.volume.is_some() && a.volume == b.volume,
            _ => false,
        }
    }
}

impl<T: FileSystem + ?Sized> FileSystem for std::sync::Arc<T> {
    fn stat(&self, location: &FileRef) -> FsResult<Metadata> {
        (**self).stat(location)
    }

    fn list_children(&self, location: &FileRef) -> FsResult<Vec<FileRef>> {
        (**self).list_children(location)
    }

    fn create_directory(&self, location: &FileRef) -> FsResult<()> {
        (**self).create_directory(location)
    }

    fn open_read(&self, location: &FileRef) -> FsResult<Box<dyn Read + Send>> {
        (**self).open_read(location)
    }

    fn open_write(&self, location: &FileRef, truncate: bool) -> FsResult<Box<dyn Write + Send>> {
        (**self).open_write(location, truncate)
    }

    fn rename(&self, from: &FileRef, to: &FileRef) -> FsResult<()> {
        (**self).rename(from, to)
    }

    fn delete(&self, location: &FileRef) -> FsResult<()> {
        (**self).delete(location)
    }

    fn move_to_trash(&self, location: &FileRef) -> FsResult<FileRef> {
        (**self).move_to_trash(location)
    }

    fn restore_from_trash(&self, trash_ref: &FileRef) -> FsResult<FileRef> {
        (**self).restore_from_trash(trash_ref)
    }

    fn trash_origin(&self, trash_ref: &FileRef) -> FsResult<FileRef> {
        (**self).trash_origin(trash_ref)
    }

    fn set_metadata(&self, location: &FileRef, metadata: &Metadata) -> FsResult<()> {
        (**self).set_metadata(location, metadata)
    }

    fn read_link(&self, location: &FileRef) -> FsResult<PathBuf> {
        (**self).read_link(location)
    }

    fn create_symlink(&self, target: &Path, link: &FileRef) -> FsResult<()> {
        (**self).create_symlink(target, link)
    }

    fn exists(&self, location: &FileRef) -> bool {
        (**self).exists(location)
    }

    fn same_volume(&self, a: &FileRef, b: &FileRef) -> bool {
        (**self).same_volume(a, b)
    }
}

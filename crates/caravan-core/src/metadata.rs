//! Entry metadata as reported by a filesystem backend.

use std::time::SystemTime;

#[cfg(unix)]
use std::os::unix::fs::{MetadataExt, PermissionsExt};

use serde::{Deserialize, Serialize};

/// Fixed progress weight of a directory, in bytes.
pub const DIRECTORY_WEIGHT: u64 = 4096;

/// Type of filesystem entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Regular file.
    #[strum(to_string = "file")]
    File,
    /// Directory.
    #[strum(to_string = "directory")]
    Directory,
    /// Symbolic link (never followed).
    #[strum(to_string = "symlink")]
    Symlink,
    /// Sockets, devices, fifos.
    #[strum(to_string = "special file")]
    Other,
}

impl EntryKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// Metadata of a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Kind of entry.
    pub kind: EntryKind,
    /// Length in bytes (0 for directories).
    pub len: u64,
    /// Last modification time.
    pub modified: Option<SystemTime>,
    /// Last access time.
    pub accessed: Option<SystemTime>,
    /// Unix permission bits, when the backend knows them.
    pub permissions: Option<u32>,
    /// Read-only flag.
    pub readonly: bool,
    /// Identifier of the storage volume holding the entry.
    pub volume: Option<u64>,
}

impl Metadata {
    /// Metadata for a synthetic entry of the given kind.
    pub fn new(kind: EntryKind, len: u64) -> Self {
        Self {
            kind,
            len,
            modified: None,
            accessed: None,
            permissions: None,
            readonly: false,
            volume: None,
        }
    }

    /// Convert from `std::fs` metadata obtained without following symlinks.
    pub fn from_std(meta: &std::fs::Metadata) -> Self {
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        Self {
            kind,
            len: if kind.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
            accessed: meta.accessed().ok(),
            permissions: permission_bits(meta),
            readonly: meta.permissions().readonly(),
            volume: volume_id(meta),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    /// Progress weight of this entry on its own.
    pub fn weight(&self) -> u64 {
        if self.is_dir() { DIRECTORY_WEIGHT } else { self.len }
    }
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> Option<u32> {
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn permission_bits(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
fn volume_id(meta: &std::fs::Metadata) -> Option<u64> {
    Some(meta.dev())
}

#[cfg(not(unix))]
fn volume_id(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight() {
        assert_eq!(Metadata::new(EntryKind::Directory, 0).weight(), DIRECTORY_WEIGHT);
        assert_eq!(Metadata::new(EntryKind::File, 17).weight(), 17);
    }

    #[test]
    fn test_from_std() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello").unwrap();

        let meta = Metadata::from_std(&std::fs::symlink_metadata(&file).unwrap());
        assert_eq!(meta.kind, EntryKind::File);
        assert_eq!(meta.len, 5);
        assert!(meta.modified.is_some());

        let meta = Metadata::from_std(&std::fs::symlink_metadata(dir.path()).unwrap());
        assert!(meta.is_dir());
        assert_eq!(meta.len, 0);
    }
}

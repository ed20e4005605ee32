//! Local disk backend.

use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use caravan_core::{EngineConfig, FileRef, FsError, Metadata, TRASH_SCHEME};

use crate::trashcan::{StagingTrash, TrashBackend};
use crate::{FileSystem, FsResult};

/// [`FileSystem`] over `std::fs`, with a pluggable trash backend.
#[derive(Clone)]
pub struct LocalFs {
    trash: Arc<dyn TrashBackend>,
}

impl std::fmt::Debug for LocalFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFs").finish_non_exhaustive()
    }
}

impl LocalFs {
    /// Create a backend using the given trash.
    pub fn new(trash: Arc<dyn TrashBackend>) -> Self {
        Self { trash }
    }

    /// Create a backend that stages trashed entries under `dir`.
    pub fn with_staging_trash(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(StagingTrash::new(dir)))
    }

    /// Pick the trash from configuration: the configured staging directory,
    /// else the desktop trash where it supports restore, else a staging
    /// directory under the user's data dir.
    pub fn from_config(config: &EngineConfig) -> Self {
        if let Some(dir) = &config.trash_dir {
            return Self::with_staging_trash(dir.clone());
        }
        Self::new(default_trash())
    }

    fn path<'a>(&self, location: &'a FileRef) -> FsResult<&'a Path> {
        location
            .as_local_path()
            .ok_or_else(|| FsError::unsupported(location.clone(), "not a local location"))
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(any(
    windows,
    all(unix, not(target_os = "macos"), not(target_os = "ios"), not(target_os = "android"))
))]
fn default_trash() -> Arc<dyn TrashBackend> {
    Arc::new(crate::trashcan::SystemTrash)
}

#[cfg(not(any(
    windows,
    all(unix, not(target_os = "macos"), not(target_os = "ios"), not(target_os = "android"))
)))]
fn default_trash() -> Arc<dyn TrashBackend> {
    Arc::new(StagingTrash::user_default())
}

impl FileSystem for LocalFs {
    fn stat(&self, location: &FileRef) -> FsResult<Metadata> {
        if location.scheme() == TRASH_SCHEME {
            return self.trash.stat(location);
        }
        let path = self.path(location)?;
        fs::symlink_metadata(path)
            .map(|meta| Metadata::from_std(&meta))
            .map_err(|e| FsError::io(location.clone(), e))
    }

    fn list_children(&self, location: &FileRef) -> FsResult<Vec<FileRef>> {
        let path = self.path(location)?;
        let entries = fs::read_dir(path).map_err(|e| FsError::io(location.clone(), e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::io(location.clone(), e))?;
            names.push(entry.file_name());
        }
        names.sort();

        Ok(names.into_iter().map(|name| location.child(name)).collect())
    }

    fn create_directory(&self, location: &FileRef) -> FsResult<()> {
        let path = self.path(location)?;
        fs::create_dir(path).map_err(|e| FsError::io(location.clone(), e))
    }

    fn open_read(&self, location: &FileRef) -> FsResult<Box<dyn Read + Send>> {
        let path = self.path(location)?;
        let file = File::open(path).map_err(|e| FsError::io(location.clone(), e))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, location: &FileRef, truncate: bool) -> FsResult<Box<dyn Write + Send>> {
        let path = self.path(location)?;
        let mut options = OpenOptions::new();
        options.write(true);
        if truncate {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options
            .open(path)
            .map_err(|e| FsError::io(location.clone(), e))?;
        Ok(Box::new(file))
    }

    fn rename(&self, from: &FileRef, to: &FileRef) -> FsResult<()> {
        let source = self.path(from)?;
        let target = self.path(to)?;

        // std::fs::rename silently replaces files, the contract does not.
        if fs::symlink_metadata(target).is_ok() {
            return Err(FsError::AlreadyExists {
                location: to.clone(),
            });
        }
        fs::rename(source, target).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound if fs::symlink_metadata(source).is_err() => {
                FsError::not_found(from.clone())
            }
            _ => FsError::io(to.clone(), e),
        })
    }

    fn delete(&self, location: &FileRef) -> FsResult<()> {
        let path = self.path(location)?;
        let meta = fs::symlink_metadata(path).map_err(|e| FsError::io(location.clone(), e))?;
        let result = if meta.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| FsError::io(location.clone(), e))
    }

    fn move_to_trash(&self, location: &FileRef) -> FsResult<FileRef> {
        let path = self.path(location)?;
        self.trash.trash(self, path)
    }

    fn restore_from_trash(&self, trash_ref: &FileRef) -> FsResult<FileRef> {
        self.trash.restore(self, trash_ref)
    }

    fn trash_origin(&self, trash_ref: &FileRef) -> FsResult<FileRef> {
        self.trash.original_location(trash_ref)
    }

    fn set_metadata(&self, location: &FileRef, metadata: &Metadata) -> FsResult<()> {
        let path = self.path(location)?;
        let current = fs::symlink_metadata(path).map_err(|e| FsError::io(location.clone(), e))?;
        if current.file_type().is_symlink() {
            return Ok(());
        }

        let mut times = FileTimes::new();
        if let Some(modified) = metadata.modified {
            times = times.set_modified(modified);
        }
        if let Some(accessed) = metadata.accessed {
            times = times.set_accessed(accessed);
        }
        let file = File::open(path).map_err(|e| FsError::io(location.clone(), e))?;
        file.set_times(times)
            .map_err(|e| FsError::io(location.clone(), e))?;

        let mut permissions = current.permissions();
        #[cfg(unix)]
        if let Some(mode) = metadata.permissions {
            use std::os::unix::fs::PermissionsExt;
            permissions.set_mode(mode);
        }
        #[cfg(not(unix))]
        permissions.set_readonly(metadata.readonly);
        fs::set_permissions(path, permissions).map_err(|e| FsError::io(location.clone(), e))
    }

    fn read_link(&self, location: &FileRef) -> FsResult<PathBuf> {
        let path = self.path(location)?;
        fs::read_link(path).map_err(|e| FsError::io(location.clone(), e))
    }

    fn create_symlink(&self, target: &Path, link: &FileRef) -> FsResult<()> {
        let path = self.path(link)?;
        symlink(target, path).map_err(|e| FsError::io(link.clone(), e))
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

#[cfg(not(any(unix, windows)))]
fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_refuses_to_replace() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::with_staging_trash(dir.path().join(".trash"));
        let a = FileRef::local(dir.path().join("a"));
        let b = FileRef::local(dir.path().join("b"));
        std::fs::write(a.path(), b"a").unwrap();
        std::fs::write(b.path(), b"b").unwrap();

        assert!(matches!(fs.rename(&a, &b), Err(FsError::AlreadyExists { .. })));
        assert_eq!(std::fs::read(b.path()).unwrap(), b"b");
    }
}

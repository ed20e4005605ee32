//! Trash backends.

use std::fs;
use std::path::{Path, PathBuf};

use caravan_core::{EntryKind, FileRef, FsError, Metadata, TRASH_SCHEME};
use chrono::{Local, NaiveDateTime};
use tracing::{debug, warn};

use crate::transfer::{DEFAULT_BUFFER_SIZE, relocate};
use crate::{FileSystem, FsResult};

/// A staging area that can take entries away and give them back.
pub trait TrashBackend: Send + Sync {
    /// Move a local entry into the trash. Content that has to be copied
    /// goes through `backend`.
    fn trash(&self, backend: &dyn FileSystem, path: &Path) -> FsResult<FileRef>;

    /// Restore a trashed entry to where it came from.
    fn restore(&self, backend: &dyn FileSystem, trash_ref: &FileRef) -> FsResult<FileRef>;

    /// Metadata of a trashed entry.
    fn stat(&self, trash_ref: &FileRef) -> FsResult<Metadata>;

    /// Where a trashed entry will be restored to.
    fn original_location(&self, trash_ref: &FileRef) -> FsResult<FileRef>;
}

const TRASHINFO_HEADER: &str = "[Trash Info]";
const TRASHINFO_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Directory-backed trash laid out like a freedesktop trash can.
///
/// Entries live in `files/<id>`, and `info/<id>.trashinfo` remembers the
/// original path and deletion date. Trash references are `trash:///<id>`.
#[derive(Debug, Clone)]
pub struct StagingTrash {
    root: PathBuf,
}

impl StagingTrash {
    /// Use `root` as the staging directory, creating it on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// A staging trash under the user's local data directory.
    pub fn user_default() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("caravan").join("trash"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    fn info_dir(&self) -> PathBuf {
        self.root.join("info")
    }

    fn ensure_layout(&self) -> FsResult<()> {
        for dir in [self.files_dir(), self.info_dir()] {
            fs::create_dir_all(&dir).map_err(|e| FsError::io(dir.as_path(), e))?;
        }
        Ok(())
    }

    fn id_of<'a>(&self, trash_ref: &'a FileRef) -> FsResult<&'a str> {
        if trash_ref.scheme() != TRASH_SCHEME {
            return Err(FsError::unsupported(trash_ref.clone(), "not a trash reference"));
        }
        trash_ref
            .name()
            .ok_or_else(|| FsError::not_found(trash_ref.clone()))
    }

    fn info_path(&self, id: &str) -> PathBuf {
        self.info_dir().join(format!("{id}.trashinfo"))
    }

    /// Pick an id not used by any staged entry: `name`, `name.2`, `name.3`, ...
    fn allocate_id(&self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut n = 2u64;
        while self.files_dir().join(&candidate).symlink_metadata().is_ok()
            || self.info_path(&candidate).exists()
        {
            candidate = format!("{name}.{n}");
            n += 1;
        }
        candidate
    }

    /// Undo the bookkeeping of a staging attempt that failed.
    ///
    /// A failed copy leaves nothing in `files/`, so only the info file goes.
    /// If the copy finished but the original could not be fully removed,
    /// the staged entry and its info stay so the content remains restorable.
    fn unwind(&self, id: &str, original: &Path) {
        if self.files_dir().join(id).symlink_metadata().is_ok() {
            warn!(
                path = %original.display(),
                id = %id,
                "original only partly removed, staged copy kept"
            );
            return;
        }
        let info_path = self.info_path(id);
        if let Err(e) = fs::remove_file(&info_path) {
            warn!(path = %info_path.display(), error = %e, "could not remove trash info");
        }
    }

    fn read_info(&self, trash_ref: &FileRef, id: &str) -> FsResult<PathBuf> {
        let info_path = self.info_path(id);
        let content = fs::read_to_string(&info_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FsError::not_found(trash_ref.clone()),
            _ => FsError::io(info_path.as_path(), e),
        })?;
        parse_trashinfo(&content).ok_or_else(|| FsError::Trash {
            location: trash_ref.clone(),
            message: format!("malformed trash info {}", info_path.display()),
        })
    }
}

impl TrashBackend for StagingTrash {
    fn trash(&self, backend: &dyn FileSystem, path: &Path) -> FsResult<FileRef> {
        self.ensure_layout()?;
        path.symlink_metadata().map_err(|e| FsError::io(path, e))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| FsError::unsupported(path, "cannot trash a filesystem root"))?;
        let id = self.allocate_id(&name);

        let info = format!(
            "{TRASHINFO_HEADER}\nPath={}\nDeletionDate={}\n",
            path.display(),
            Local::now().format(TRASHINFO_DATE_FORMAT)
        );
        let info_path = self.info_path(&id);
        fs::write(&info_path, info).map_err(|e| FsError::io(info_path.as_path(), e))?;

        let staged = FileRef::local(self.files_dir().join(&id));
        if let Err(e) = relocate(backend, &FileRef::local(path), &staged, DEFAULT_BUFFER_SIZE) {
            self.unwind(&id, path);
            return Err(e);
        }

        debug!(path = %path.display(), id = %id, "staged entry in trash");
        Ok(FileRef::new(TRASH_SCHEME, format!("/{id}")))
    }

    fn restore(&self, backend: &dyn FileSystem, trash_ref: &FileRef) -> FsResult<FileRef> {
        let id = self.id_of(trash_ref)?;
        let original = self.read_info(trash_ref, id)?;

        if original.symlink_metadata().is_ok() {
            return Err(FsError::AlreadyExists {
                location: FileRef::local(&original),
            });
        }
        if let Some(parent) = original.parent() {
            fs::create_dir_all(parent).map_err(|e| FsError::io(parent, e))?;
        }

        relocate(
            backend,
            &FileRef::local(self.files_dir().join(id)),
            &FileRef::local(&original),
            DEFAULT_BUFFER_SIZE,
        )?;
        let info_path = self.info_path(id);
        fs::remove_file(&info_path).map_err(|e| FsError::io(info_path.as_path(), e))?;

        debug!(id = %id, path = %original.display(), "restored entry from trash");
        Ok(FileRef::local(original))
    }

    fn stat(&self, trash_ref: &FileRef) -> FsResult<Metadata> {
        let id = self.id_of(trash_ref)?;
        let staged = self.files_dir().join(id);
        match staged.symlink_metadata() {
            Ok(meta) => Ok(Metadata::from_std(&meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FsError::not_found(trash_ref.clone()))
            }
            Err(e) => Err(FsError::io(staged.as_path(), e)),
        }
    }

    fn original_location(&self, trash_ref: &FileRef) -> FsResult<FileRef> {
        let id = self.id_of(trash_ref)?;
        self.read_info(trash_ref, id).map(FileRef::local)
    }
}

fn parse_trashinfo(content: &str) -> Option<PathBuf> {
    let mut lines = content.lines();
    if lines.next()?.trim() != TRASHINFO_HEADER {
        return None;
    }
    let mut path = None;
    for line in lines {
        if let Some(value) = line.strip_prefix("Path=") {
            path = Some(PathBuf::from(value));
        } else if let Some(value) = line.strip_prefix("DeletionDate=") {
            NaiveDateTime::parse_from_str(value.trim(), TRASHINFO_DATE_FORMAT).ok()?;
        }
    }
    path
}

/// The desktop's own trash, through the `trash` crate.
#[cfg(any(
    windows,
    all(unix, not(target_os = "macos"), not(target_os = "ios"), not(target_os = "android"))
))]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTrash;

#[cfg(any(
    windows,
    all(unix, not(target_os = "macos"), not(target_os = "ios"), not(target_os = "android"))
))]
impl SystemTrash {
    fn find(&self, trash_ref: &FileRef) -> FsResult<trash::TrashItem> {
        trash::os_limited::list()
            .map_err(|e| trash_error(trash_ref, e))?
            .into_iter()
            .find(|item| FileRef::new(TRASH_SCHEME, &item.id) == *trash_ref)
            .ok_or_else(|| FsError::not_found(trash_ref.clone()))
    }
}

#[cfg(any(
    windows,
    all(unix, not(target_os = "macos"), not(target_os = "ios"), not(target_os = "android"))
))]
fn trash_error(location: &FileRef, error: trash::Error) -> FsError {
    FsError::Trash {
        location: location.clone(),
        message: error.to_string(),
    }
}

#[cfg(any(
    windows,
    all(unix, not(target_os = "macos"), not(target_os = "ios"), not(target_os = "android"))
))]
impl TrashBackend for SystemTrash {
    fn trash(&self, _backend: &dyn FileSystem, path: &Path) -> FsResult<FileRef> {
        let location = FileRef::local(path);
        trash::delete(path).map_err(|e| trash_error(&location, e))?;

        // The crate does not hand back the item, so look it up by origin.
        let item = trash::os_limited::list()
            .map_err(|e| trash_error(&location, e))?
            .into_iter()
            .filter(|item| FileRef::local(item.original_path()) == location)
            .max_by_key(|item| item.time_deleted)
            .ok_or_else(|| FsError::Trash {
                location: location.clone(),
                message: "trashed entry not found in trash listing".to_string(),
            })?;

        Ok(FileRef::new(TRASH_SCHEME, &item.id))
    }

    fn restore(&self, _backend: &dyn FileSystem, trash_ref: &FileRef) -> FsResult<FileRef> {
        let item = self.find(trash_ref)?;
        let original = FileRef::local(item.original_path());
        trash::os_limited::restore_all([item]).map_err(|e| trash_error(trash_ref, e))?;
        Ok(original)
    }

    fn stat(&self, trash_ref: &FileRef) -> FsResult<Metadata> {
        self.find(trash_ref).map(|_| Metadata::new(EntryKind::Other, 0))
    }

    fn original_location(&self, trash_ref: &FileRef) -> FsResult<FileRef> {
        self.find(trash_ref)
            .map(|item| FileRef::local(item.original_path()))
    }
}

//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use caravan_core::{EngineConfig, FileRef, FsError, Metadata};
use caravan_ops::Engine;
use caravan_vfs::{FileSystem, FsResult, LocalFs};
use tempfile::TempDir;

/// Backend call a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Stat,
    CreateDirectory,
    OpenWrite,
    Rename,
    Delete,
    Trash,
    SetMetadata,
}

/// Error a fault produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Transient,
    PermissionDenied,
    DiskFull,
}

#[derive(Debug)]
struct Fault {
    call: Call,
    location: FileRef,
    kind: FaultKind,
    remaining: usize,
}

/// Local backend with injectable failures and a simulated second volume.
///
/// Everything under `volume_boundary` counts as another device: renames
/// across it fail with `CrossesDevices`.
pub struct FaultyFs {
    inner: LocalFs,
    faults: Mutex<Vec<Fault>>,
    volume_boundary: Mutex<Option<FileRef>>,
    single_volume_reported: AtomicBool,
    calls: Mutex<Vec<(Call, FileRef)>>,
}

impl FaultyFs {
    pub fn new(trash_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: LocalFs::with_staging_trash(trash_dir),
            faults: Mutex::new(Vec::new()),
            volume_boundary: Mutex::new(None),
            single_volume_reported: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `times` calls of `call` on `location`.
    pub fn fail(&self, call: Call, location: &FileRef, kind: FaultKind, times: usize) {
        self.faults.lock().unwrap().push(Fault {
            call,
            location: location.clone(),
            kind,
            remaining: times,
        });
    }

    pub fn split_volume_at(&self, boundary: &FileRef) {
        *self.volume_boundary.lock().unwrap() = Some(boundary.clone());
    }

    /// Report every pair of entries as one volume while renames across the
    /// boundary keep failing, like a bind mount or overlay.
    pub fn report_single_volume(&self) {
        self.single_volume_reported.store(true, Ordering::SeqCst);
    }

    /// Number of `call`s made on `location` so far.
    pub fn count(&self, call: Call, location: &FileRef) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, l)| *c == call && l == location)
            .count()
    }

    fn check(&self, call: Call, location: &FileRef) -> FsResult<()> {
        self.calls.lock().unwrap().push((call, location.clone()));
        let mut faults = self.faults.lock().unwrap();
        let Some(fault) = faults
            .iter_mut()
            .find(|f| f.call == call && f.location == *location && f.remaining > 0)
        else {
            return Ok(());
        };
        fault.remaining -= 1;
        let location = location.clone();
        Err(match fault.kind {
            FaultKind::Transient => FsError::Transient {
                location,
                source: std::io::Error::from(std::io::ErrorKind::Interrupted),
            },
            FaultKind::PermissionDenied => FsError::PermissionDenied { location },
            FaultKind::DiskFull => FsError::NotEnoughSpace { location },
        })
    }

    fn on_far_side(&self, location: &FileRef) -> bool {
        self.volume_boundary
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|b| location.is_within(b))
    }
}

impl FileSystem for FaultyFs {
    fn stat(&self, location: &FileRef) -> FsResult<Metadata> {
        self.check(Call::Stat, location)?;
        self.inner.stat(location)
    }

    fn list_children(&self, location: &FileRef) -> FsResult<Vec<FileRef>> {
        self.inner.list_children(location)
    }

    fn create_directory(&self, location: &FileRef) -> FsResult<()> {
        self.check(Call::CreateDirectory, location)?;
        self.inner.create_directory(location)
    }

    fn open_read(&self, location: &FileRef) -> FsResult<Box<dyn Read + Send>> {
        self.inner.open_read(location)
    }

    fn open_write(&self, location: &FileRef, truncate: bool) -> FsResult<Box<dyn Write + Send>> {
        self.check(Call::OpenWrite, location)?;
        self.inner.open_write(location, truncate)
    }

    fn rename(&self, from: &FileRef, to: &FileRef) -> FsResult<()> {
        self.check(Call::Rename, from)?;
        if self.on_far_side(from) != self.on_far_side(to) {
            return Err(FsError::CrossesDevices {
                location: to.clone(),
            });
        }
        self.inner.rename(from, to)
    }

    fn delete(&self, location: &FileRef) -> FsResult<()> {
        self.check(Call::Delete, location)?;
        self.inner.delete(location)
    }

    fn move_to_trash(&self, location: &FileRef) -> FsResult<FileRef> {
        self.check(Call::Trash, location)?;
        self.inner.move_to_trash(location)
    }

    fn restore_from_trash(&self, trash_ref: &FileRef) -> FsResult<FileRef> {
        self.inner.restore_from_trash(trash_ref)
    }

    fn trash_origin(&self, trash_ref: &FileRef) -> FsResult<FileRef> {
        self.inner.trash_origin(trash_ref)
    }

    fn set_metadata(&self, location: &FileRef, metadata: &Metadata) -> FsResult<()> {
        self.check(Call::SetMetadata, location)?;
        self.inner.set_metadata(location, metadata)
    }

    fn read_link(&self, location: &FileRef) -> FsResult<PathBuf> {
        self.inner.read_link(location)
    }

    fn create_symlink(&self, target: &Path, link: &FileRef) -> FsResult<()> {
        self.inner.create_symlink(target, link)
    }

    fn same_volume(&self, a: &FileRef, b: &FileRef) -> bool {
        self.exists(a)
            && self.exists(b)
            && (self.single_volume_reported.load(Ordering::SeqCst)
                || self.on_far_side(a) == self.on_far_side(b))
    }
}

/// A temporary tree with an engine over it.
pub struct Fixture {
    pub dir: TempDir,
    pub root: FileRef,
    pub fs: Arc<FaultyFs>,
    pub engine: Engine,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(mut config: EngineConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let trash = dir.path().join(".trash");
        config.trash_dir = Some(trash.clone());
        config.progress_interval_ms = 0;

        let root = FileRef::local(dir.path().join("work"));
        std::fs::create_dir(root.path()).unwrap();

        let fs = Arc::new(FaultyFs::new(trash));
        let engine = Engine::new(fs.clone(), config);
        Self {
            dir,
            root,
            fs,
            engine,
        }
    }

    pub fn path(&self, relative: &str) -> FileRef {
        self.root.child(relative)
    }

    pub fn file(&self, relative: &str, content: &str) -> FileRef {
        let location = self.path(relative);
        if let Some(parent) = location.path().parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(location.path(), content).unwrap();
        location
    }

    pub fn dir(&self, relative: &str) -> FileRef {
        let location = self.path(relative);
        std::fs::create_dir_all(location.path()).unwrap();
        location
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative).path()).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        std::fs::symlink_metadata(self.path(relative).path()).is_ok()
    }

    /// Sorted relative paths of everything under `relative`.
    pub fn tree(&self, relative: &str) -> Vec<String> {
        let base = self.path(relative);
        let mut out = Vec::new();
        collect(base.path(), base.path(), &mut out);
        out.sort();
        out
    }
}

fn collect(base: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        out.push(
            path.strip_prefix(base)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/"),
        );
        if path.is_dir() && !path.is_symlink() {
            collect(base, &path, out);
        }
    }
}

//! Content transfer over any [`FileSystem`], shared by the engine and the
//! staging trash.

use std::io::{Read, Write};

use caravan_core::{FileRef, FsError, Metadata};
use tracing::{debug, warn};

use crate::{FileSystem, FsResult};

/// Buffer size used when no configuration is at hand.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Copy a file or symlink to `dest`, returning the bytes written.
///
/// With `overwrite` an existing file at `dest` is truncated; otherwise
/// `dest` must be free. A partly written new file is removed on failure.
pub fn copy_entry(
    fs: &dyn FileSystem,
    source: &FileRef,
    meta: &Metadata,
    dest: &FileRef,
    overwrite: bool,
    buffer_size: usize,
) -> FsResult<u64> {
    if meta.is_symlink() {
        let target = fs.read_link(source)?;
        if overwrite && fs.exists(dest) {
            fs.delete(dest)?;
        }
        fs.create_symlink(&target, dest)?;
        return Ok(0);
    }

    let mut reader = fs.open_read(source)?;
    let mut writer = fs.open_write(dest, overwrite)?;
    match pump(&mut *reader, &mut *writer, source, dest, buffer_size) {
        Ok(written) => Ok(written),
        Err(e) => {
            drop(writer);
            if !overwrite {
                if let Err(cleanup) = fs.delete(dest) {
                    warn!(location = %dest, error = %cleanup, "could not remove partial copy");
                }
            }
            Err(e)
        }
    }
}

fn pump(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    source: &FileRef,
    dest: &FileRef,
    buffer_size: usize,
) -> FsResult<u64> {
    let mut buffer = vec![0u8; buffer_size.max(4096)];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FsError::io(source.clone(), e)),
        };
        writer
            .write_all(&buffer[..n])
            .map_err(|e| FsError::io(dest.clone(), e))?;
        written += n as u64;
    }
    writer.flush().map_err(|e| FsError::io(dest.clone(), e))?;
    Ok(written)
}

/// Recursively copy `source` to the free location `dest`, keeping
/// timestamps and permissions where the backend allows.
///
/// On failure nothing is left at `dest`, so the copy can simply be tried
/// again.
pub fn copy_tree(
    fs: &dyn FileSystem,
    source: &FileRef,
    dest: &FileRef,
    buffer_size: usize,
) -> FsResult<u64> {
    let meta = fs.stat(source)?;
    if !meta.is_dir() {
        let written = copy_entry(fs, source, &meta, dest, false, buffer_size)?;
        preserve(fs, dest, &meta);
        return Ok(written);
    }

    fs.create_directory(dest)?;
    match copy_children(fs, source, dest, buffer_size) {
        Ok(written) => {
            preserve(fs, dest, &meta);
            Ok(written)
        }
        Err(e) => {
            discard(fs, dest);
            Err(e)
        }
    }
}

fn copy_children(
    fs: &dyn FileSystem,
    source: &FileRef,
    dest: &FileRef,
    buffer_size: usize,
) -> FsResult<u64> {
    let mut written = 0;
    for child in fs.list_children(source)? {
        let Some(name) = child.path().file_name() else {
            continue;
        };
        written += copy_tree(fs, &child, &dest.child(name), buffer_size)?;
    }
    Ok(written)
}

/// Recursively delete `location`, children first.
pub fn remove_tree(fs: &dyn FileSystem, location: &FileRef) -> FsResult<()> {
    let meta = fs.stat(location)?;
    if meta.is_dir() {
        for child in fs.list_children(location)? {
            remove_tree(fs, &child)?;
        }
    }
    fs.delete(location)
}

/// Move `source` to `dest`, copying and removing it when the rename
/// crosses devices.
///
/// A failed copy leaves nothing at `dest`. A failed removal leaves the
/// complete copy at `dest` and whatever remains of `source`.
pub fn relocate(
    fs: &dyn FileSystem,
    source: &FileRef,
    dest: &FileRef,
    buffer_size: usize,
) -> FsResult<()> {
    match fs.rename(source, dest) {
        Err(FsError::CrossesDevices { .. }) => {
            debug!(source = %source, destination = %dest, "rename crosses devices, copying");
            copy_tree(fs, source, dest, buffer_size)?;
            remove_tree(fs, source)
        }
        other => other,
    }
}

fn preserve(fs: &dyn FileSystem, dest: &FileRef, meta: &Metadata) {
    if let Err(e) = fs.set_metadata(dest, meta) {
        debug!(location = %dest, error = %e, "metadata not preserved");
    }
}

/// Best-effort removal of a half-built copy.
fn discard(fs: &dyn FileSystem, dest: &FileRef) {
    if !fs.exists(dest) {
        return;
    }
    if let Err(e) = remove_tree(fs, dest) {
        warn!(location = %dest, error = %e, "could not remove partial copy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalFs;

    #[test]
    fn test_relocate_moves_tree() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::with_staging_trash(dir.path().join(".trash"));
        let source = dir.path().join("src");
        std::fs::create_dir_all(source.join("inner")).unwrap();
        std::fs::write(source.join("inner/file"), b"x").unwrap();

        let dest = dir.path().join("dst");
        relocate(
            &fs,
            &FileRef::local(&source),
            &FileRef::local(&dest),
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap();
        assert!(!source.exists());
        assert_eq!(std::fs::read(dest.join("inner/file")).unwrap(), b"x");
    }

    #[test]
    fn test_copy_tree_refuses_occupied_destination() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::with_staging_trash(dir.path().join(".trash"));
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a"), b"a").unwrap();
        std::fs::create_dir_all(dir.path().join("dst")).unwrap();
        std::fs::write(dir.path().join("dst/keep"), b"k").unwrap();

        let result = copy_tree(
            &fs,
            &FileRef::local(dir.path().join("src")),
            &FileRef::local(dir.path().join("dst")),
            DEFAULT_BUFFER_SIZE,
        );

        assert!(matches!(result, Err(FsError::AlreadyExists { .. })));
        assert_eq!(std::fs::read(dir.path().join("dst/keep")).unwrap(), b"k");
    }
}

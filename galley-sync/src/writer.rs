//! Atomic file writes and removals for recipe and staging trees.
//!
//! `write_file` writes to `<path>.galley.tmp` and renames over the target, so
//! a reader never observes a half-written file. State tracking is the
//! caller's job and must happen after the write returns.

use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};

pub(crate) fn write_file(path: &Path, content: &[u8]) -> Result<(), SyncError> {
    let tmp = PathBuf::from(format!("{}.galley.tmp", path.display()));
    write_file_with_tmp(path, content, &tmp)
}

fn write_file_with_tmp(path: &Path, content: &[u8], tmp: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(())
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>, SyncError> {
    std::fs::read(path).map_err(|e| io_err(path, e))
}

/// Remove a file or a whole directory tree.
pub(crate) fn remove_path(path: &Path) -> Result<(), SyncError> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| io_err(path, e))?;
    tracing::info!("deleted: {}", path.display());
    Ok(())
}

/// Remove `dir` and its contents; a missing directory is not an error.
pub(crate) fn clear_dir(dir: &Path) -> Result<(), SyncError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::debug!("cleared: {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(dir, e)),
    }
}

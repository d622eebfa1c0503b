//! Minimal directory sets for remote fetch requests.

use galley_core::RecipePath;

use crate::error::SyncError;

/// Keep only directories with no strict ancestor in `dirs`.
///
/// The result is sorted and duplicate-free, and every input directory is
/// contained in some retained one.
pub fn minimal_paths(dirs: &[RecipePath]) -> Vec<RecipePath> {
    let mut sorted = dirs.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut kept: Vec<RecipePath> = Vec::new();
    for dir in sorted {
        // An ancestor always sorts before its descendants.
        if !kept.iter().any(|k| k.is_strict_ancestor_of(&dir)) {
            kept.push(dir);
        }
    }
    kept
}

/// True when `path` lies under (or is) one of `dirs`.
pub fn is_covered(path: &RecipePath, dirs: &[RecipePath]) -> bool {
    dirs.iter().any(|d| d.contains(path))
}

/// Kitchen and recipe names become single directory names on disk.
pub(crate) fn validate_name(name: &'static str, value: &str) -> Result<(), SyncError> {
    let reason = if value.trim().is_empty() {
        "must not be empty"
    } else if value.contains(['/', '\\']) {
        "must not contain path separators"
    } else if value == "." || value == ".." {
        "must not be a relative directory"
    } else {
        return Ok(());
    };
    Err(SyncError::InvalidParameter {
        name,
        reason: reason.to_string(),
    })
}

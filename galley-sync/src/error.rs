//! Error types for galley-sync.

use std::path::PathBuf;

use thiserror::Error;

use galley_core::{ConfigError, PathError, StatusError};
use galley_tools::ToolError;

use crate::remote::RemoteError;

/// Coarse classification used by the CLI to pick an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad parameters, missing recipe, path outside root, nothing staged.
    Validation,
    /// The remote moved; `recipe-get` first.
    RemoteChanged,
    /// Unresolved conflicts or a local kitchen out of sync.
    Conflict,
    /// Transport, HTTP, rejected update, expired baseline, merge failure.
    Remote,
    Io,
}

/// All errors that can arise from sync and merge operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Path(#[from] PathError),

    /// The remote sent a status that breaks the one-category-per-file rule.
    #[error("inconsistent recipe status: {0}")]
    Status(#[from] StatusError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON error reading or writing the local state store.
    #[error("state store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("bad parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("recipe directory {} does not exist", path.display())]
    RecipeNotFound { path: PathBuf },

    #[error(
        "{} files have remote changes. Please run 'galley recipe-get' first.\n{}",
        files.len(),
        tab_list(files)
    )]
    RemoteChanged { files: Vec<String> },

    /// The remote refused or failed to merge one file.
    #[error("merge of '{path}' failed: {reason}")]
    MergeFailed { path: String, reason: String },

    #[error(
        "file {} not found. The file path is incorrect. Use the file path specified in kitchen-merge-preview command output",
        path.display()
    )]
    NotStaged { path: PathBuf },

    #[error("no merge preview staged for {from_kitchen} to {to_kitchen}. Please run kitchen-merge-preview command before running kitchen-merge")]
    NoPreview {
        from_kitchen: String,
        to_kitchen: String,
    },

    #[error(
        "there are unresolved conflicts, please resolve them with file-merge and file-resolve:\n{}",
        tab_list(paths)
    )]
    UnresolvedConflicts { paths: Vec<String> },

    /// Files left with conflict markers by `recipe-get` and not yet edited.
    #[error(
        "{} files still contain conflict markers; resolve them before running recipe-update:\n{}",
        paths.len(),
        tab_list(paths)
    )]
    ConflictMarkers { paths: Vec<String> },

    #[error("unable to update files due to errors in recipe:\n\n{report}")]
    UpdateRejected { report: String },

    #[error(
        "local recipe '{recipe}' at {} has uncommitted changes; run recipe-update or recipe-get before merging kitchens",
        path.display()
    )]
    KitchenOutOfSync { recipe: String, path: PathBuf },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Config(ConfigError::Io { .. }) => ErrorKind::Io,
            SyncError::Config(_)
            | SyncError::Path(_)
            | SyncError::InvalidParameter { .. }
            | SyncError::RecipeNotFound { .. }
            | SyncError::NotStaged { .. }
            | SyncError::NoPreview { .. } => ErrorKind::Validation,
            SyncError::Tool(ToolError::Launch { .. }) => ErrorKind::Io,
            SyncError::Tool(_) => ErrorKind::Validation,
            SyncError::RemoteChanged { .. } => ErrorKind::RemoteChanged,
            SyncError::UnresolvedConflicts { .. }
            | SyncError::ConflictMarkers { .. }
            | SyncError::KitchenOutOfSync { .. } => ErrorKind::Conflict,
            SyncError::Status(_)
            | SyncError::Remote(_)
            | SyncError::MergeFailed { .. }
            | SyncError::UpdateRejected { .. } => ErrorKind::Remote,
            SyncError::Io { .. } | SyncError::Json(_) => ErrorKind::Io,
        }
    }
}

fn tab_list(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("\t{i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

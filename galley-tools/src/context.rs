//! Template contexts for the merge and diff tool commands.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ToolError;

/// The four staged variants handed to the merge tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeToolPaths {
    pub left: PathBuf,
    pub base: PathBuf,
    pub right: PathBuf,
    pub merge: PathBuf,
}

impl MergeToolPaths {
    /// Variant paths for staged file `stem` (`<stem>.left`, `<stem>.base`, …).
    pub fn for_stem(stem: &Path) -> Self {
        let with = |suffix: &str| PathBuf::from(format!("{}.{suffix}", stem.display()));
        Self {
            left: with("left"),
            base: with("base"),
            right: with("right"),
            merge: with("merge"),
        }
    }

    /// All four paths, in `left, base, right, merge` order.
    pub fn all(&self) -> [&Path; 4] {
        [&self.left, &self.base, &self.right, &self.merge]
    }
}

/// Local file and fetched remote copy handed to the diff tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffToolPaths {
    pub local: PathBuf,
    pub remote: PathBuf,
}

#[derive(Serialize)]
struct MergeCtx {
    left: String,
    base: String,
    right: String,
    merge: String,
}

#[derive(Serialize)]
struct DiffCtx {
    local: String,
    remote: String,
}

/// The path as one shell word.
#[cfg(not(windows))]
fn quoted(path: &Path) -> Result<String, ToolError> {
    let raw = path.display().to_string();
    match shlex::try_quote(&raw) {
        Ok(word) => Ok(word.into_owned()),
        Err(_) => Err(ToolError::UnquotablePath { path: raw.clone() }),
    }
}

#[cfg(windows)]
fn quoted(path: &Path) -> Result<String, ToolError> {
    Ok(format!("\"{}\"", path.display()))
}

impl MergeToolPaths {
    pub(crate) fn to_tera_context(&self) -> Result<tera::Context, ToolError> {
        let ctx = MergeCtx {
            left: quoted(&self.left)?,
            base: quoted(&self.base)?,
            right: quoted(&self.right)?,
            merge: quoted(&self.merge)?,
        };
        Ok(tera::Context::from_serialize(ctx)?)
    }
}

impl DiffToolPaths {
    pub(crate) fn to_tera_context(&self) -> Result<tera::Context, ToolError> {
        let ctx = DiffCtx {
            local: quoted(&self.local)?,
            remote: quoted(&self.remote)?,
        };
        Ok(tera::Context::from_serialize(ctx)?)
    }
}

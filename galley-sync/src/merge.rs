//! Per-file three-way merges computed by the remote.

use galley_core::{ContentId, FileEncoding, KitchenName, RecipeName, RecipePath};

use crate::error::SyncError;
use crate::remote::{MergeFileRequest, RecipeRemote};

const MARKERS: [&str; 3] = ["<<<<<<<", "=======", ">>>>>>>"];

/// The remote does not track per-file merge bases; it merges against the
/// recipe baseline.
const LAST_FILE_ID: &str = "none";

/// True only when all three conflict markers are present.
pub fn has_conflict_markers(content: &str) -> bool {
    MARKERS.iter().all(|m| content.contains(m))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    /// Clean merge; content is ready to write.
    Merged(String),
    /// Merge produced conflict markers; content is still written.
    Conflicted(String),
    /// Binary files are never merged; use overwrite.
    SkippedBinary,
}

pub struct FileMergeCoordinator<'a> {
    remote: &'a dyn RecipeRemote,
}

impl<'a> FileMergeCoordinator<'a> {
    pub fn new(remote: &'a dyn RecipeRemote) -> Self {
        Self { remote }
    }

    /// Merge `local_content` of `path` with the remote head.
    ///
    /// Errors are [`SyncError::MergeFailed`] (or the remote error itself) and
    /// carry no content, so nothing partial can be written.
    pub fn merge(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        path: &RecipePath,
        local_content: &[u8],
        baseline_id: &ContentId,
    ) -> Result<MergeResult, SyncError> {
        if FileEncoding::infer(path.file_name()).is_binary() {
            tracing::debug!("skipping merge of binary file {path}");
            return Ok(MergeResult::SkippedBinary);
        }

        let request = MergeFileRequest {
            kitchen: kitchen.clone(),
            recipe: recipe.clone(),
            path: path.clone(),
            content: local_content.to_vec(),
            baseline_id: baseline_id.clone(),
            last_file_id: LAST_FILE_ID.to_string(),
        };
        let response = self.remote.merge_file(&request)?;

        let failed = |reason: String| SyncError::MergeFailed {
            path: path.to_string(),
            reason,
        };
        if let Some(error) = response.error {
            return Err(failed(error));
        }
        let Some(bytes) = response.merged_content else {
            return Err(failed("remote returned no merged content".to_string()));
        };
        let merged = String::from_utf8(bytes)
            .map_err(|_| failed("merged content is not valid UTF-8".to_string()))?;

        if has_conflict_markers(&merged) {
            tracing::info!("conflict in {path}");
            Ok(MergeResult::Conflicted(merged))
        } else {
            Ok(MergeResult::Merged(merged))
        }
    }
}

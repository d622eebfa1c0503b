//! The remote recipe store as seen by the orchestrators.
//!
//! Content is carried as raw bytes here; wire encodings (base64, JSON) belong
//! to the implementation of [`RecipeRemote`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use galley_core::{ContentId, KitchenName, RecipeName, RecipePath, RecipeStatus};

/// Phrase the remote uses when a kitchen head moved after the preview.
pub const BASELINE_EXPIRED_HINT: &str = "run kitchen-merge-preview again";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures talking to the remote.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Non-2xx response.
    #[error("remote returned HTTP {status} for {url}: {body}")]
    Http { status: u16, url: String, body: String },

    /// Connection, TLS or timeout failure.
    #[error("could not reach remote at {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// The heads recorded at preview time are no longer current.
    #[error("{message} (please run kitchen-merge-preview again)")]
    BaselineExpired { message: String },

    /// The client was constructed with unusable settings.
    #[error("invalid remote settings: {reason}")]
    InvalidHandle { reason: String },

    /// The remote understood the request and refused it.
    #[error("remote rejected the request: {message}")]
    Rejected { message: String },

    /// Local state needed to compare against the remote could not be read.
    #[error("could not read local recipe state: {reason}")]
    LocalState { reason: String },
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// One file of a fetched recipe tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub filename: String,
    pub content_id: ContentId,
    pub content: Vec<u8>,
}

/// Full or partial recipe contents.
///
/// Folder keys are rooted one level above the recipe (`demo/resources`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeTree {
    pub baseline_id: ContentId,
    pub folders: BTreeMap<String, Vec<RemoteFile>>,
}

impl RecipeTree {
    pub fn files(&self) -> impl Iterator<Item = (&str, &RemoteFile)> {
        self.folders
            .iter()
            .flat_map(|(folder, files)| files.iter().map(move |f| (folder.as_str(), f)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFileRequest {
    pub kitchen: KitchenName,
    pub recipe: RecipeName,
    pub path: RecipePath,
    /// Local file bytes.
    pub content: Vec<u8>,
    pub baseline_id: ContentId,
    pub last_file_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeFileResponse {
    pub merged_content: Option<Vec<u8>>,
    pub error: Option<String>,
}

/// One entry of an update batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Upsert { contents: Vec<u8>, is_new: bool },
    Delete,
}

/// Recipe-relative path → change.
pub type ChangeSet = BTreeMap<RecipePath, FileChange>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    #[serde(other)]
    Info,
}

/// A validation finding reported by the remote for an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub file: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
}

/// Group issues by file: `file:` followed by one tab-indented line per issue.
pub fn format_issues(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return "No issues found".to_string();
    }
    let mut by_file: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for issue in issues {
        let label = match issue.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
        };
        by_file
            .entry(issue.file.as_str())
            .or_default()
            .push(format!("\t{label}: {}", issue.description));
    }
    let mut lines = Vec::new();
    for (file, issues) in by_file {
        lines.push(format!("{}:", if file.is_empty() { "No file" } else { file }));
        lines.extend(issues);
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResponse {
    /// Files the remote reformatted; written back locally.
    pub formatted_files: BTreeMap<RecipePath, Vec<u8>>,
    pub issues: Vec<Issue>,
    /// Per-file success flag.
    pub results: BTreeMap<RecipePath, bool>,
    /// New recipe head, when the remote reports one.
    pub recipe_sha: Option<ContentId>,
}

impl UpdateResponse {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }
}

/// One changed file of a kitchen merge preview.
///
/// `file` is kitchen-relative (`<recipe>/<path>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewResult {
    pub file: RecipePath,
    pub status: String,
    pub base: Vec<u8>,
    pub left: Vec<u8>,
    pub right: Vec<u8>,
    pub merge: Vec<u8>,
}

impl PreviewResult {
    pub fn is_conflict(&self) -> bool {
        self.status == "conflict"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePreview {
    pub results: Vec<PreviewResult>,
    pub warnings: Vec<String>,
    pub source_kitchen_sha: ContentId,
    pub target_kitchen_sha: ContentId,
    pub url: Option<String>,
}

/// Kitchen heads recorded at preview time and replayed at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeHeads {
    pub source_kitchen_sha: ContentId,
    pub target_kitchen_sha: ContentId,
}

/// Manually resolved content submitted with a kitchen merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedContent {
    Text(String),
    Binary(Vec<u8>),
}

/// One running order serving in a kitchen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingSummary {
    pub serving_id: String,
    #[serde(default)]
    pub recipe: String,
    #[serde(default)]
    pub variation: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Operations the sync engine needs from the remote recipe store.
pub trait RecipeRemote {
    /// Categorized comparison of the local recipe at `local_path` against the
    /// remote head.
    fn recipe_status(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        local_path: &Path,
    ) -> Result<RecipeStatus, RemoteError>;

    /// Fetch the recipe, or only `paths` (recipe-relative; `dir/*` selects a
    /// whole directory).
    fn get_recipe(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        paths: Option<&[String]>,
    ) -> Result<RecipeTree, RemoteError>;

    fn merge_file(&self, request: &MergeFileRequest) -> Result<MergeFileResponse, RemoteError>;

    fn update_files(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        message: &str,
        changes: &ChangeSet,
    ) -> Result<UpdateResponse, RemoteError>;

    fn kitchen_merge_preview(
        &self,
        source: &KitchenName,
        target: &KitchenName,
    ) -> Result<MergePreview, RemoteError>;

    /// Merge `source` into `target`; returns a link to the result when the
    /// remote provides one.
    fn kitchens_merge(
        &self,
        source: &KitchenName,
        target: &KitchenName,
        heads: &MergeHeads,
        resolved: &BTreeMap<RecipePath, ResolvedContent>,
    ) -> Result<Option<String>, RemoteError>;

    fn active_servings(&self, kitchen: &KitchenName) -> Result<Vec<ServingSummary>, RemoteError>;
}

//! JSON bodies exchanged with the remote, and their conversion to the
//! byte-oriented types of [`galley_sync::remote`].

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use galley_core::{ContentId, RecipePath};
use galley_sync::remote::{
    ChangeSet, FileChange, Issue, MergeFileResponse, MergePreview, PreviewResult, RecipeTree,
    RemoteFile, ResolvedContent, ServingSummary, UpdateResponse,
};

pub(crate) fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 `text`; the error names `field` so decode failures can be
/// traced to one file.
pub(crate) fn decode(field: &str, text: &str) -> Result<Vec<u8>, String> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| format!("{field}: invalid base64 content: {e}"))
}

// ---------------------------------------------------------------------------
// Recipe get
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct GetRequest<'a> {
    pub paths: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFile {
    filename: String,
    sha: ContentId,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTree {
    baseline_id: ContentId,
    #[serde(default)]
    folders: BTreeMap<String, Vec<WireFile>>,
}

impl WireTree {
    pub fn into_tree(self) -> Result<RecipeTree, String> {
        let mut folders = BTreeMap::new();
        for (folder, files) in self.folders {
            let mut decoded = Vec::with_capacity(files.len());
            for file in files {
                let content = decode(&format!("{folder}/{}", file.filename), &file.content)?;
                decoded.push(RemoteFile {
                    filename: file.filename,
                    content_id: file.sha,
                    content,
                });
            }
            folders.insert(folder, decoded);
        }
        Ok(RecipeTree {
            baseline_id: self.baseline_id,
            folders,
        })
    }
}

// ---------------------------------------------------------------------------
// File merge
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct MergeRequest {
    pub file: String,
    pub orig_head: ContentId,
    pub last_file_sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMergeResponse {
    #[serde(default)]
    merged_content: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl WireMergeResponse {
    pub fn into_response(self, path: &RecipePath) -> Result<MergeFileResponse, String> {
        let merged_content = self
            .merged_content
            .map(|text| decode(path.as_str(), &text))
            .transpose()?;
        Ok(MergeFileResponse {
            merged_content,
            error: self.error.filter(|e| !e.is_empty()),
        })
    }
}

// ---------------------------------------------------------------------------
// Recipe update
// ---------------------------------------------------------------------------

/// A delete is sent as an empty object.
#[derive(Debug, Serialize)]
pub(crate) struct WireChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    contents: Option<String>,
    #[serde(rename = "isNew", skip_serializing_if = "Option::is_none")]
    is_new: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateRequest<'a> {
    pub message: &'a str,
    pub changes: BTreeMap<&'a RecipePath, WireChange>,
}

impl<'a> UpdateRequest<'a> {
    pub fn new(message: &'a str, changes: &'a ChangeSet) -> Self {
        let changes = changes
            .iter()
            .map(|(path, change)| {
                let wire = match change {
                    FileChange::Upsert { contents, is_new } => WireChange {
                        contents: Some(encode(contents)),
                        is_new: Some(*is_new),
                    },
                    FileChange::Delete => WireChange {
                        contents: None,
                        is_new: None,
                    },
                };
                (path, wire)
            })
            .collect();
        Self { message, changes }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUpdateResponse {
    #[serde(default)]
    formatted_files: BTreeMap<RecipePath, String>,
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    results: BTreeMap<RecipePath, bool>,
    #[serde(default)]
    recipe_sha: Option<ContentId>,
}

impl WireUpdateResponse {
    pub fn into_response(self) -> Result<UpdateResponse, String> {
        let mut formatted_files = BTreeMap::new();
        for (path, text) in self.formatted_files {
            let bytes = decode(path.as_str(), &text)?;
            formatted_files.insert(path, bytes);
        }
        Ok(UpdateResponse {
            formatted_files,
            issues: self.issues,
            results: self.results,
            recipe_sha: self.recipe_sha,
        })
    }
}

// ---------------------------------------------------------------------------
// Kitchen merge
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct WirePreviewResult {
    file: RecipePath,
    status: String,
    #[serde(default)]
    base: String,
    #[serde(default)]
    left: String,
    #[serde(default)]
    right: String,
    #[serde(default)]
    merge: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePreview {
    #[serde(default)]
    results: Vec<WirePreviewResult>,
    #[serde(default)]
    warnings: Vec<String>,
    source_kitchen_sha: ContentId,
    target_kitchen_sha: ContentId,
    #[serde(default)]
    url: Option<String>,
}

impl WirePreview {
    pub fn into_preview(self) -> Result<MergePreview, String> {
        let mut results = Vec::with_capacity(self.results.len());
        for r in self.results {
            let field = |suffix: &str| format!("{}.{suffix}", r.file);
            results.push(PreviewResult {
                base: decode(&field("base"), &r.base)?,
                left: decode(&field("left"), &r.left)?,
                right: decode(&field("right"), &r.right)?,
                merge: decode(&field("merge"), &r.merge)?,
                file: r.file,
                status: r.status,
            });
        }
        Ok(MergePreview {
            results,
            warnings: self.warnings,
            source_kitchen_sha: self.source_kitchen_sha,
            target_kitchen_sha: self.target_kitchen_sha,
            url: self.url,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum WireResolved {
    Text(String),
    Base64(String),
}

#[derive(Debug, Serialize)]
pub(crate) struct KitchenMergeRequest<'a> {
    pub source_kitchen_sha: &'a ContentId,
    pub target_kitchen_sha: &'a ContentId,
    pub resolved: BTreeMap<&'a RecipePath, WireResolved>,
}

impl<'a> KitchenMergeRequest<'a> {
    pub fn resolved(
        resolved: &'a BTreeMap<RecipePath, ResolvedContent>,
    ) -> BTreeMap<&'a RecipePath, WireResolved> {
        resolved
            .iter()
            .map(|(path, content)| {
                let wire = match content {
                    ResolvedContent::Text(text) => WireResolved::Text(text.clone()),
                    ResolvedContent::Binary(bytes) => WireResolved::Base64(encode(bytes)),
                };
                (path, wire)
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct KitchenMergeResponse {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub sha_expired: bool,
}

/// Shape of an error body; every field is optional.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub sha_expired: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServingsResponse {
    #[serde(default)]
    pub servings: Vec<ServingSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(raw: &str) -> RecipePath {
        RecipePath::parse(raw).unwrap()
    }

    #[test]
    fn tree_contents_are_base64_decoded() {
        let wire: WireTree = serde_json::from_value(json!({
            "baseline_id": "head",
            "folders": {
                "demo/res": [{ "filename": "a.txt", "sha": "1", "content": encode(b"hello") }]
            }
        }))
        .unwrap();
        let tree = wire.into_tree().unwrap();
        let (folder, file) = tree.files().next().unwrap();
        assert_eq!(folder, "demo/res");
        assert_eq!(file.content, b"hello");
        assert_eq!(tree.baseline_id.0, "head");
    }

    #[test]
    fn bad_base64_names_the_file() {
        let wire: WireTree = serde_json::from_value(json!({
            "baseline_id": "head",
            "folders": { "demo": [{ "filename": "a.txt", "sha": "1", "content": "***" }] }
        }))
        .unwrap();
        let err = wire.into_tree().unwrap_err();
        assert!(err.starts_with("demo/a.txt:"), "{err}");
    }

    #[test]
    fn deletes_serialize_as_empty_objects() {
        let mut changes = ChangeSet::new();
        changes.insert(p("gone.txt"), FileChange::Delete);
        changes.insert(
            p("new.txt"),
            FileChange::Upsert {
                contents: b"x".to_vec(),
                is_new: true,
            },
        );
        let body = serde_json::to_value(UpdateRequest::new("msg", &changes)).unwrap();
        assert_eq!(
            body,
            json!({
                "message": "msg",
                "changes": {
                    "gone.txt": {},
                    "new.txt": { "contents": encode(b"x"), "isNew": true }
                }
            })
        );
    }

    #[test]
    fn resolved_binary_content_is_tagged() {
        let mut resolved = BTreeMap::new();
        resolved.insert(p("demo/a.sql"), ResolvedContent::Text("x".into()));
        resolved.insert(p("demo/logo.png"), ResolvedContent::Binary(vec![0, 1]));
        let body = serde_json::to_value(KitchenMergeRequest::resolved(&resolved)).unwrap();
        assert_eq!(
            body,
            json!({
                "demo/a.sql": { "text": "x" },
                "demo/logo.png": { "base64": encode(&[0, 1]) }
            })
        );
    }

    #[test]
    fn empty_merge_error_is_not_an_error() {
        let wire: WireMergeResponse =
            serde_json::from_value(json!({ "merged_content": encode(b"m"), "error": "" })).unwrap();
        let response = wire.into_response(&p("a.txt")).unwrap();
        assert_eq!(response.merged_content.as_deref(), Some(&b"m"[..]));
        assert!(response.error.is_none());
    }
}

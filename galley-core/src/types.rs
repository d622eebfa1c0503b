//! Domain types for kitchens, recipes and recipe status payloads.
//!
//! Filesystem paths inside a recipe are carried as [`RecipePath`], a validated
//! `/`-separated relative path. Conversion to `PathBuf` happens only at the
//! disk boundary via [`RecipePath::to_fs_path`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PathError, StatusError};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed kitchen (namespace) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KitchenName(pub String);

impl fmt::Display for KitchenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for KitchenName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for KitchenName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed recipe name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipeName(pub String);

impl fmt::Display for RecipeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RecipeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecipeName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque content identifier (file sha, recipe head, kitchen head).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct ContentId(pub String);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ContentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// RecipePath
// ---------------------------------------------------------------------------

/// Validated recipe-relative path, always `/`-separated.
///
/// Empty, `.` and `..` segments are rejected, as are absolute paths, so a
/// `RecipePath` can never point outside the root it is joined to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecipePath(String);

impl RecipePath {
    /// Parse and normalise a user- or remote-supplied relative path.
    ///
    /// Backslashes are treated as separators and a trailing separator is
    /// dropped.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let invalid = |reason| PathError {
            path: raw.to_string(),
            reason,
        };
        let normalized = raw.replace('\\', "/");
        if normalized.starts_with('/') || has_drive_prefix(&normalized) {
            return Err(invalid("path must be relative to the recipe root"));
        }
        let trimmed = normalized.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(invalid("path is empty"));
        }
        for segment in trimmed.split('/') {
            match segment {
                "" => return Err(invalid("path contains an empty segment")),
                "." | ".." => return Err(invalid("path points outside the recipe root")),
                _ => {}
            }
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Build a path from a folder (None = recipe root) and a file name.
    pub fn in_folder(folder: Option<&RecipePath>, name: &str) -> Result<Self, PathError> {
        match folder {
            Some(folder) => folder.join(name),
            None => Self::parse(name),
        }
    }

    /// Relative path of `path` under `root`, if `path` lies inside it.
    pub fn from_fs_path(root: &Path, path: &Path) -> Result<Self, PathError> {
        let relative = path.strip_prefix(root).map_err(|_| PathError {
            path: path.display().to_string(),
            reason: "path is not inside the recipe root",
        })?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                _ => {
                    return Err(PathError {
                        path: path.display().to_string(),
                        reason: "path points outside the recipe root",
                    })
                }
            }
        }
        Self::parse(&segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Append `name` (which may itself contain separators).
    pub fn join(&self, name: &str) -> Result<Self, PathError> {
        Self::parse(&format!("{}/{}", self.0, name))
    }

    /// Parent folder, or `None` for a top-level entry.
    pub fn parent(&self) -> Option<RecipePath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| RecipePath(parent.to_string()))
    }

    /// Last segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// True when `self` is a proper ancestor directory of `other`.
    pub fn is_strict_ancestor_of(&self, other: &RecipePath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub fn contains(&self, other: &RecipePath) -> bool {
        self == other || self.is_strict_ancestor_of(other)
    }

    /// Location of this path under `root` on disk.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.segments() {
            path.push(segment);
        }
        path
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl fmt::Display for RecipePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for RecipePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecipePath> for String {
    fn from(path: RecipePath) -> Self {
        path.0
    }
}

/// Strip the leading recipe segment from a remote folder key.
///
/// Remote payloads are rooted one level above the recipe (`demo/resources`).
/// Returns `Ok(None)` for the recipe root itself. A key rooted at any other
/// recipe is rejected.
pub fn strip_recipe_root(recipe: &str, folder: &str) -> Result<Option<RecipePath>, PathError> {
    let normalized = folder.replace('\\', "/");
    let trimmed = normalized.trim_matches('/');
    let (root, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if root != recipe {
        return Err(PathError {
            path: folder.to_string(),
            reason: "folder is not under the recipe",
        });
    }
    if rest.is_empty() {
        Ok(None)
    } else {
        RecipePath::parse(rest).map(Some)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// How a file's bytes are carried and merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEncoding {
    Text,
    Binary,
}

const BINARY_EXTENSIONS: &[&str] = &[
    "7z", "avro", "bin", "bmp", "bz2", "class", "dll", "doc", "docx", "exe", "gif", "gz", "h5",
    "ico", "jar", "jpeg", "jpg", "parquet", "pdf", "pkl", "png", "ppt", "pptx", "pyc", "so",
    "tar", "tgz", "tif", "tiff", "xls", "xlsx", "zip",
];

impl FileEncoding {
    /// Infer the encoding from a file name's extension.
    pub fn infer(name: &str) -> Self {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if BINARY_EXTENSIONS.contains(&extension.as_str()) {
            FileEncoding::Binary
        } else {
            FileEncoding::Text
        }
    }

    pub fn is_binary(self) -> bool {
        self == FileEncoding::Binary
    }
}

// ---------------------------------------------------------------------------
// Status payload
// ---------------------------------------------------------------------------

/// One file as reported in a status category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    #[serde(rename = "sha", default)]
    pub content_id: ContentId,
}

impl FileRecord {
    pub fn new(filename: impl Into<String>, content_id: impl Into<ContentId>) -> Self {
        Self {
            filename: filename.into(),
            content_id: content_id.into(),
        }
    }
}

/// Folder key (rooted above the recipe) → files in that folder.
pub type CategoryMap = BTreeMap<String, Vec<FileRecord>>;

/// Comparison outcome buckets of a recipe status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Same,
    LocalModified,
    RemoteModified,
    LocalAndRemoteModified,
    Different,
    OnlyLocal,
    OnlyLocalDir,
    OnlyRemote,
    OnlyRemoteDir,
}

impl Category {
    /// All categories in wire order.
    pub fn all() -> &'static [Category] {
        &[
            Category::Same,
            Category::LocalModified,
            Category::RemoteModified,
            Category::LocalAndRemoteModified,
            Category::Different,
            Category::OnlyLocal,
            Category::OnlyLocalDir,
            Category::OnlyRemote,
            Category::OnlyRemoteDir,
        ]
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Category::Same => "same",
            Category::LocalModified => "local_modified",
            Category::RemoteModified => "remote_modified",
            Category::LocalAndRemoteModified => "local_and_remote_modified",
            Category::Different => "different",
            Category::OnlyLocal => "only_local",
            Category::OnlyLocalDir => "only_local_dir",
            Category::OnlyRemote => "only_remote",
            Category::OnlyRemoteDir => "only_remote_dir",
        }
    }

    /// Directory categories carry folder keys with empty file lists.
    pub fn is_directory(self) -> bool {
        matches!(self, Category::OnlyLocalDir | Category::OnlyRemoteDir)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Typed recipe status: one explicit field per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RecipeStatus {
    #[serde(default)]
    pub same: CategoryMap,
    #[serde(default)]
    pub local_modified: CategoryMap,
    #[serde(default)]
    pub remote_modified: CategoryMap,
    #[serde(default)]
    pub local_and_remote_modified: CategoryMap,
    #[serde(default)]
    pub different: CategoryMap,
    #[serde(default)]
    pub only_local: CategoryMap,
    #[serde(default)]
    pub only_local_dir: CategoryMap,
    #[serde(default)]
    pub only_remote: CategoryMap,
    #[serde(default)]
    pub only_remote_dir: CategoryMap,
    /// Remote recipe head the status was computed against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_sha: Option<ContentId>,
}

impl RecipeStatus {
    pub fn category(&self, category: Category) -> &CategoryMap {
        match category {
            Category::Same => &self.same,
            Category::LocalModified => &self.local_modified,
            Category::RemoteModified => &self.remote_modified,
            Category::LocalAndRemoteModified => &self.local_and_remote_modified,
            Category::Different => &self.different,
            Category::OnlyLocal => &self.only_local,
            Category::OnlyLocalDir => &self.only_local_dir,
            Category::OnlyRemote => &self.only_remote,
            Category::OnlyRemoteDir => &self.only_remote_dir,
        }
    }

    pub fn category_mut(&mut self, category: Category) -> &mut CategoryMap {
        match category {
            Category::Same => &mut self.same,
            Category::LocalModified => &mut self.local_modified,
            Category::RemoteModified => &mut self.remote_modified,
            Category::LocalAndRemoteModified => &mut self.local_and_remote_modified,
            Category::Different => &mut self.different,
            Category::OnlyLocal => &mut self.only_local,
            Category::OnlyLocalDir => &mut self.only_local_dir,
            Category::OnlyRemote => &mut self.only_remote,
            Category::OnlyRemoteDir => &mut self.only_remote_dir,
        }
    }

    /// Add `record` under `folder` in `category`.
    pub fn push(&mut self, category: Category, folder: impl Into<String>, record: FileRecord) {
        self.category_mut(category)
            .entry(folder.into())
            .or_default()
            .push(record);
    }

    /// Mark a whole `folder` as differing in a directory category.
    pub fn push_dir(&mut self, category: Category, folder: impl Into<String>) {
        self.category_mut(category).entry(folder.into()).or_default();
    }

    /// Every `(folder, record)` pair of a category.
    pub fn files(&self, category: Category) -> impl Iterator<Item = (&str, &FileRecord)> {
        self.category(category)
            .iter()
            .flat_map(|(folder, records)| records.iter().map(move |r| (folder.as_str(), r)))
    }

    /// Check that no `(folder, filename)` pair is reported twice.
    pub fn validate(&self) -> Result<(), StatusError> {
        let mut seen: HashMap<(&str, &str), Category> = HashMap::new();
        for category in Category::all() {
            for (folder, record) in self.files(*category) {
                if let Some(first) = seen.insert((folder, record.filename.as_str()), *category) {
                    return Err(StatusError::DuplicateEntry {
                        folder: folder.to_string(),
                        filename: record.filename.clone(),
                        first,
                        second: *category,
                    });
                }
            }
        }
        Ok(())
    }

    /// Nothing differs between local and remote.
    pub fn is_clean(&self) -> bool {
        Category::all()
            .iter()
            .filter(|c| **c != Category::Same)
            .all(|c| self.category(*c).is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn newtype_display() {
        assert_eq!(KitchenName::from("dev").to_string(), "dev");
        assert_eq!(RecipeName::from("demo").to_string(), "demo");
        assert_eq!(ContentId::from("abc").to_string(), "abc");
    }

    #[rstest]
    #[case("a.txt", "a.txt")]
    #[case("resources/a.txt", "resources/a.txt")]
    #[case("resources\\sub\\a.txt", "resources/sub/a.txt")]
    #[case("resources/", "resources")]
    fn recipe_path_parse_normalizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(RecipePath::parse(raw).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("/etc/passwd")]
    #[case("../outside.txt")]
    #[case("a/../../b")]
    #[case("a//b")]
    #[case("C:/temp/a.txt")]
    fn recipe_path_parse_rejects(#[case] raw: &str) {
        assert!(RecipePath::parse(raw).is_err(), "{raw} should be rejected");
    }

    #[test]
    fn ancestor_checks_respect_segment_boundaries() {
        let a = RecipePath::parse("res").unwrap();
        let b = RecipePath::parse("res/sub").unwrap();
        let c = RecipePath::parse("resources").unwrap();
        assert!(a.is_strict_ancestor_of(&b));
        assert!(!b.is_strict_ancestor_of(&a));
        assert!(!a.is_strict_ancestor_of(&c));
        assert!(!a.is_strict_ancestor_of(&a));
        assert!(a.contains(&a));
    }

    #[test]
    fn parent_and_file_name() {
        let p = RecipePath::parse("a/b/c.txt").unwrap();
        assert_eq!(p.file_name(), "c.txt");
        assert_eq!(p.parent().unwrap().as_str(), "a/b");
        assert!(RecipePath::parse("top.txt").unwrap().parent().is_none());
    }

    #[test]
    fn from_fs_path_roundtrip() {
        let root = Path::new("/kitchens/dev/demo");
        let p = RecipePath::parse("resources/a.sql").unwrap();
        let fs = p.to_fs_path(root);
        assert_eq!(RecipePath::from_fs_path(root, &fs).unwrap(), p);
        assert!(RecipePath::from_fs_path(root, Path::new("/elsewhere/a.sql")).is_err());
    }

    #[test]
    fn strip_recipe_root_drops_recipe_segment() {
        assert_eq!(strip_recipe_root("demo", "demo").unwrap(), None);
        assert_eq!(strip_recipe_root("demo", "demo/").unwrap(), None);
        assert_eq!(
            strip_recipe_root("demo", "demo/resources/sql").unwrap(),
            Some(RecipePath::parse("resources/sql").unwrap())
        );
    }

    #[test]
    fn strip_recipe_root_rejects_foreign_recipe() {
        let err = strip_recipe_root("demo", "other/res").unwrap_err();
        assert_eq!(err.path, "other/res");
        assert!(strip_recipe_root("demo", "demo2").is_err());
        assert!(strip_recipe_root("demo", "").is_err());
    }

    #[rstest]
    #[case("image.PNG", FileEncoding::Binary)]
    #[case("archive.tar", FileEncoding::Binary)]
    #[case("notebook.json", FileEncoding::Text)]
    #[case("Makefile", FileEncoding::Text)]
    fn encoding_inferred_from_extension(#[case] name: &str, #[case] expected: FileEncoding) {
        assert_eq!(FileEncoding::infer(name), expected);
    }

    #[test]
    fn validate_rejects_file_in_two_categories() {
        let mut status = RecipeStatus::default();
        status.push(Category::Same, "demo", FileRecord::new("a.txt", "1"));
        status.push(Category::RemoteModified, "demo", FileRecord::new("a.txt", "2"));
        let err = status.validate().unwrap_err();
        assert_eq!(
            err,
            StatusError::DuplicateEntry {
                folder: "demo".into(),
                filename: "a.txt".into(),
                first: Category::Same,
                second: Category::RemoteModified,
            }
        );
    }

    #[test]
    fn directory_entries_do_not_count_as_files() {
        let mut status = RecipeStatus::default();
        status.push_dir(Category::OnlyRemoteDir, "demo/new");
        status.push(Category::OnlyRemote, "demo/new", FileRecord::new("x.txt", "1"));
        assert!(status.validate().is_ok());
        assert!(!status.is_clean());
    }

    #[test]
    fn status_deserializes_with_missing_categories() {
        let json = r#"{"same":{"demo":[{"filename":"a.txt","sha":"1"}]},"recipe_sha":"head"}"#;
        let status: RecipeStatus = serde_yaml::from_str(json).expect("parse");
        assert_eq!(status.same["demo"][0].content_id, ContentId::from("1"));
        assert!(status.remote_modified.is_empty());
        assert_eq!(status.recipe_sha, Some(ContentId::from("head")));
        assert!(status.is_clean());
    }
}

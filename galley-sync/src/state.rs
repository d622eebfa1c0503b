//! Per-recipe local state: baseline head, file content ids, open conflicts.
//!
//! Persists a [`RecipeLocalState`] JSON document at
//! `<recipe>/.galley/state.json`. Every mutating call saves immediately with
//! the atomic `.tmp` + rename pattern, so the store on disk never runs ahead of
//! or behind the last successful content write by more than one file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use galley_core::config::META_DIR;
use galley_core::{ContentId, RecipePath};

use crate::error::{io_err, SyncError};

const STATE_FILE: &str = "state.json";

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_id_of(bytes: &[u8]) -> ContentId {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentId(hex::encode(hasher.finalize()))
}

/// On-disk state payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipeLocalState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<ContentId>,
    pub synced_at: DateTime<Utc>,
    #[serde(default)]
    pub files: BTreeMap<String, ContentId>,
    #[serde(default)]
    pub conflicts: BTreeSet<String>,
}

impl Default for RecipeLocalState {
    fn default() -> Self {
        Self {
            baseline: None,
            synced_at: Utc::now(),
            files: BTreeMap::new(),
            conflicts: BTreeSet::new(),
        }
    }
}

/// Handle on one recipe's state store.
#[derive(Debug)]
pub struct LocalStateTracker {
    path: PathBuf,
    state: RecipeLocalState,
}

impl LocalStateTracker {
    /// `<recipe_dir>/.galley/state.json`
    pub fn store_path(recipe_dir: &Path) -> PathBuf {
        recipe_dir.join(META_DIR).join(STATE_FILE)
    }

    /// Load the store for `recipe_dir`; a missing store loads as empty.
    pub fn open(recipe_dir: &Path) -> Result<Self, SyncError> {
        let path = Self::store_path(recipe_dir);
        if !path.exists() {
            return Ok(Self {
                path,
                state: RecipeLocalState::default(),
            });
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let state = serde_json::from_str(&contents)?;
        Ok(Self { path, state })
    }

    pub fn state(&self) -> &RecipeLocalState {
        &self.state
    }

    pub fn baseline(&self) -> Option<&ContentId> {
        self.state.baseline.as_ref()
    }

    pub fn lookup(&self, path: &RecipePath) -> Option<&ContentId> {
        self.state.files.get(path.as_str())
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &str> {
        self.state.conflicts.iter().map(String::as_str)
    }

    pub fn record(&mut self, path: &RecipePath, content_id: ContentId) -> Result<(), SyncError> {
        self.state.files.insert(path.to_string(), content_id);
        self.save()
    }

    /// Drop `path` and, when it is a directory, everything under it.
    pub fn forget(&mut self, path: &RecipePath) -> Result<(), SyncError> {
        let prefix = format!("{path}/");
        self.state
            .files
            .retain(|key, _| key != path.as_str() && !key.starts_with(&prefix));
        self.state
            .conflicts
            .retain(|key| key != path.as_str() && !key.starts_with(&prefix));
        self.save()
    }

    pub fn set_baseline(&mut self, baseline: ContentId) -> Result<(), SyncError> {
        self.state.baseline = Some(baseline);
        self.save()
    }

    pub fn mark_conflicted(&mut self, path: &RecipePath) -> Result<(), SyncError> {
        self.state.conflicts.insert(path.to_string());
        self.save()
    }

    pub fn clear_conflict(&mut self, path: &RecipePath) -> Result<(), SyncError> {
        if self.state.conflicts.remove(path.as_str()) {
            self.save()?;
        }
        Ok(())
    }

    /// Remove the store from disk.
    pub fn delete(self) -> Result<(), SyncError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&self.path, e)),
        }
    }

    fn save(&mut self) -> Result<(), SyncError> {
        let Some(dir) = self.path.parent() else {
            return Err(io_err(
                &self.path,
                std::io::Error::other("invalid state store path"),
            ));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        self.state.synced_at = Utc::now();
        let json = serde_json::to_string_pretty(&self.state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

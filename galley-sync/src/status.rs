//! Compute a [`RecipeStatus`] locally from a remote manifest.
//!
//! Each file present on both sides is compared against the content id the
//! [`LocalStateTracker`] recorded at the last sync:
//!
//! | local vs remote | local vs base | remote vs base | category |
//! |---|---|---|---|
//! | equal | – | – | `same` |
//! | differ | no base recorded | – | `different` |
//! | differ | changed | unchanged | `local_modified` |
//! | differ | unchanged | changed | `remote_modified` |
//! | differ | changed | changed | `local_and_remote_modified` |
//!
//! Files under a one-sided directory are listed in the file category as well
//! as the directory itself in the `_dir` category.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use galley_core::types::strip_recipe_root;
use galley_core::{
    Category, ContentId, FileRecord, IgnoreRules, RecipeName, RecipePath, RecipeStatus,
};

use crate::error::{io_err, SyncError};
use crate::paths::minimal_paths;
use crate::state::{content_id_of, LocalStateTracker};
use crate::writer::read_file;

/// Remote recipe head plus the content id of every remote file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteManifest {
    pub recipe_sha: ContentId,
    #[serde(default)]
    pub files: BTreeMap<RecipePath, ContentId>,
}

/// Files and directories found under a recipe directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTree {
    pub files: BTreeMap<RecipePath, ContentId>,
    pub dirs: BTreeSet<RecipePath>,
}

/// Remote folder key for `folder` (`None` = recipe root).
pub fn folder_key(recipe: &RecipeName, folder: Option<&RecipePath>) -> String {
    match folder {
        Some(folder) => format!("{recipe}/{folder}"),
        None => recipe.to_string(),
    }
}

/// Recipe-relative path of `filename` listed under remote folder key `folder`.
/// Keys rooted at another recipe are rejected.
pub fn record_path(
    recipe: &RecipeName,
    folder: &str,
    filename: &str,
) -> Result<RecipePath, SyncError> {
    let folder = strip_recipe_root(&recipe.0, folder)?;
    Ok(RecipePath::in_folder(folder.as_ref(), filename)?)
}

pub struct LocalStatusComputer {
    ignore: IgnoreRules,
}

impl LocalStatusComputer {
    pub fn new(ignore: IgnoreRules) -> Self {
        Self { ignore }
    }

    /// Walk `recipe_dir`, skipping ignored names, hashing every file.
    pub fn scan(&self, recipe_dir: &Path) -> Result<LocalTree, SyncError> {
        let mut tree = LocalTree::default();
        let walker = WalkDir::new(recipe_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.ignore.ignores(&e.file_name().to_string_lossy()));
        for entry in walker {
            let entry = entry.map_err(|e| walk_err(recipe_dir, e))?;
            let path = RecipePath::from_fs_path(recipe_dir, entry.path())?;
            if entry.file_type().is_dir() {
                tree.dirs.insert(path);
            } else if entry.file_type().is_file() {
                let bytes = read_file(entry.path())?;
                tree.files.insert(path, content_id_of(&bytes));
            }
        }
        Ok(tree)
    }

    pub fn compute(
        &self,
        recipe: &RecipeName,
        recipe_dir: &Path,
        manifest: &RemoteManifest,
        tracker: &LocalStateTracker,
    ) -> Result<RecipeStatus, SyncError> {
        let local = self.scan(recipe_dir)?;
        let remote: BTreeMap<&RecipePath, &ContentId> = manifest
            .files
            .iter()
            .filter(|(path, _)| !self.ignore.ignores_path(path.as_str()))
            .collect();

        let mut status = RecipeStatus {
            recipe_sha: Some(manifest.recipe_sha.clone()),
            ..RecipeStatus::default()
        };

        for (path, local_id) in &local.files {
            let (category, id) = match remote.get(path) {
                None => (Category::OnlyLocal, local_id),
                Some(remote_id) if *remote_id == local_id => (Category::Same, local_id),
                Some(remote_id) => (classify_diverged(tracker.lookup(path), local_id, remote_id), *remote_id),
            };
            status.push(
                category,
                folder_key(recipe, path.parent().as_ref()),
                FileRecord::new(path.file_name(), id.clone()),
            );
        }

        let mut remote_dirs = BTreeSet::new();
        for (path, remote_id) in &remote {
            let mut ancestor = path.parent();
            while let Some(dir) = ancestor {
                ancestor = dir.parent();
                remote_dirs.insert(dir);
            }
            if !local.files.contains_key(*path) {
                status.push(
                    Category::OnlyRemote,
                    folder_key(recipe, path.parent().as_ref()),
                    FileRecord::new(path.file_name(), (*remote_id).clone()),
                );
            }
        }

        let local_only: Vec<RecipePath> = local.dirs.difference(&remote_dirs).cloned().collect();
        for dir in minimal_paths(&local_only) {
            status.push_dir(Category::OnlyLocalDir, folder_key(recipe, Some(&dir)));
        }
        let remote_only: Vec<RecipePath> = remote_dirs.difference(&local.dirs).cloned().collect();
        for dir in minimal_paths(&remote_only) {
            status.push_dir(Category::OnlyRemoteDir, folder_key(recipe, Some(&dir)));
        }

        status.validate()?;
        Ok(status)
    }
}

fn classify_diverged(base: Option<&ContentId>, local: &ContentId, remote: &ContentId) -> Category {
    let Some(base) = base else {
        return Category::Different;
    };
    match (base != local, base != remote) {
        (true, true) => Category::LocalAndRemoteModified,
        (true, false) => Category::LocalModified,
        (false, _) => Category::RemoteModified,
    }
}

fn walk_err(root: &Path, err: walkdir::Error) -> SyncError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    io_err(path, source)
}

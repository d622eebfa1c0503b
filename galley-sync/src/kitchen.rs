//! Cross-kitchen merges staged on disk.
//!
//! The staging directory `<merge_root>/<source>_to_<target>/` holds, for every
//! conflicting file, `<path>.base`, `<path>.left`, `<path>.right` and
//! `<path>.merge`, plus `<path>.resolved` once the user marks it resolved.
//! `source_kitchen_sha` and `target_kitchen_sha` record the heads the preview
//! was computed against; commit replays them so the remote can reject a stale
//! merge.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use galley_core::{ContentId, FileEncoding, IgnoreRules, KitchenName, RecipeName, RecipePath};
use galley_tools::{MergeToolPaths, ToolLauncher, ToolRun};

use crate::error::{io_err, SyncError};
use crate::paths::validate_name;
use crate::recipe::{GetOptions, RecipeSyncOrchestrator};
use crate::remote::{MergeHeads, RecipeRemote, RemoteError, ResolvedContent};
use crate::state::LocalStateTracker;
use crate::writer::{clear_dir, read_file, write_file};

const SOURCE_HEAD_FILE: &str = "source_kitchen_sha";
const TARGET_HEAD_FILE: &str = "target_kitchen_sha";

/// One changed file in a merge preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    /// Kitchen-relative path (`<recipe>/<path>`).
    pub file: RecipePath,
    /// Remote status, or `resolved` for a conflict already resolved locally.
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewOutcome {
    pub entries: Vec<PreviewEntry>,
    pub warnings: Vec<String>,
    pub url: Option<String>,
    pub staging_dir: PathBuf,
}

impl PreviewOutcome {
    pub fn conflicts(&self) -> impl Iterator<Item = &PreviewEntry> {
        self.entries.iter().filter(|e| e.status == "conflict")
    }

    pub fn render(&self, source: &KitchenName, target: &KitchenName) -> String {
        let rule = "-".repeat(71);
        let mut out =
            String::from("--- Merge Preview Results (only changed files are being displayed): ---\n");
        if self.entries.is_empty() {
            out.push_str("Nothing to merge.\n");
        }
        for entry in &self.entries {
            out.push_str(&format!("{:>8}\t\t{}\n", entry.status, entry.file));
        }
        out.push_str(&rule);
        out.push('\n');
        if !self.warnings.is_empty() {
            out.push_str(&format!("\n--- Warnings {}\n", "-".repeat(58)));
            for warning in &self.warnings {
                out.push_str(&format!("-> {warning}\n"));
            }
            out.push_str(&rule);
            out.push('\n');
        }
        if let Some(url) = &self.url {
            out.push_str(&format!("\nUrl: \t{url}\n"));
        }
        out.push_str(&format!(
            "\nIf there are conflicts, remember to resolve using the following commands:\n\
             'galley file-merge --source-kitchen {source} --target-kitchen {target} <file_path>' and\n\
             'galley file-resolve --source-kitchen {source} --target-kitchen {target} <file_path>'\n\
             where <file_path> is the path as stated in the Merge Preview Results\n"
        ));
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub url: Option<String>,
    /// Manually resolved files submitted with the merge.
    pub resolved: Vec<RecipePath>,
}

pub struct KitchenMergeOrchestrator<'a> {
    remote: &'a dyn RecipeRemote,
    merge_root: PathBuf,
}

impl<'a> KitchenMergeOrchestrator<'a> {
    pub fn new(remote: &'a dyn RecipeRemote, merge_root: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            merge_root: merge_root.into(),
        }
    }

    /// `<merge_root>/<source>_to_<target>`
    pub fn staging_dir(&self, source: &KitchenName, target: &KitchenName) -> PathBuf {
        self.merge_root.join(format!("{source}_to_{target}"))
    }

    /// Fetch the remote preview and stage every conflict.
    ///
    /// With `clean`, the staging directory is recreated and earlier
    /// resolutions are lost; without it existing `.resolved` files survive.
    pub fn preview(
        &self,
        source: &KitchenName,
        target: &KitchenName,
        clean: bool,
    ) -> Result<PreviewOutcome, SyncError> {
        validate_kitchens(source, target)?;
        let preview = self.remote.kitchen_merge_preview(source, target)?;

        let staging = self.staging_dir(source, target);
        if clean {
            clear_dir(&staging)?;
        }
        std::fs::create_dir_all(&staging).map_err(|e| io_err(&staging, e))?;
        write_file(
            &staging.join(SOURCE_HEAD_FILE),
            preview.source_kitchen_sha.0.as_bytes(),
        )?;
        write_file(
            &staging.join(TARGET_HEAD_FILE),
            preview.target_kitchen_sha.0.as_bytes(),
        )?;

        let mut entries = Vec::with_capacity(preview.results.len());
        for result in &preview.results {
            let mut status = result.status.clone();
            if result.is_conflict() {
                let stem = result.file.to_fs_path(&staging);
                if resolved_path(&stem).is_file() {
                    status = "resolved".to_string();
                }
                let variants = MergeToolPaths::for_stem(&stem);
                write_file(&variants.base, &result.base)?;
                write_file(&variants.left, &result.left)?;
                write_file(&variants.right, &result.right)?;
                write_file(&variants.merge, &result.merge)?;
            }
            entries.push(PreviewEntry {
                file: result.file.clone(),
                status,
            });
        }

        tracing::info!(
            "staged merge preview {source} -> {target} in {}",
            staging.display()
        );
        Ok(PreviewOutcome {
            entries,
            warnings: preview.warnings,
            url: preview.url,
            staging_dir: staging,
        })
    }

    /// Open the configured merge tool on the staged variants of `path`.
    pub fn file_merge(
        &self,
        source: &KitchenName,
        target: &KitchenName,
        path: &RecipePath,
        launcher: &ToolLauncher,
    ) -> Result<ToolRun, SyncError> {
        validate_kitchens(source, target)?;
        let stem = path.to_fs_path(&self.staging_dir(source, target));
        let variants = MergeToolPaths::for_stem(&stem);
        if let Some(missing) = variants.all().into_iter().find(|p| !p.is_file()) {
            return Err(SyncError::NotStaged {
                path: missing.to_path_buf(),
            });
        }
        Ok(launcher.run_merge(&variants)?)
    }

    /// Mark `path` resolved by copying its `.base` to `.resolved`.
    pub fn file_resolve(
        &self,
        source: &KitchenName,
        target: &KitchenName,
        path: &RecipePath,
    ) -> Result<PathBuf, SyncError> {
        validate_kitchens(source, target)?;
        let stem = path.to_fs_path(&self.staging_dir(source, target));
        let base = MergeToolPaths::for_stem(&stem).base;
        if !base.is_file() {
            return Err(SyncError::NotStaged { path: base });
        }
        let contents = read_file(&base)?;
        let resolved = resolved_path(&stem);
        write_file(&resolved, &contents)?;
        Ok(resolved)
    }

    /// Submit the merge with every staged conflict resolved.
    pub fn commit(
        &self,
        source: &KitchenName,
        target: &KitchenName,
    ) -> Result<CommitOutcome, SyncError> {
        validate_kitchens(source, target)?;
        let staging = self.staging_dir(source, target);
        if !staging.is_dir() {
            return Err(SyncError::NoPreview {
                from_kitchen: source.to_string(),
                to_kitchen: target.to_string(),
            });
        }
        let heads = MergeHeads {
            source_kitchen_sha: read_head(&staging, SOURCE_HEAD_FILE, source, target)?,
            target_kitchen_sha: read_head(&staging, TARGET_HEAD_FILE, source, target)?,
        };

        let mut resolved = BTreeMap::new();
        let mut missing = Vec::new();
        for entry in WalkDir::new(&staging).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let err = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                io_err(&staging, err)
            })?;
            let name = entry.file_name().to_string_lossy();
            let Some(stem_name) = name.strip_suffix(".base") else {
                continue;
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let stem = entry.path().with_file_name(stem_name);
            let path = RecipePath::from_fs_path(&staging, &stem)?;
            let resolved_file = resolved_path(&stem);
            if !resolved_file.is_file() {
                missing.push(path.to_string());
                continue;
            }
            let bytes = read_file(&resolved_file)?;
            let content = match FileEncoding::infer(stem_name) {
                FileEncoding::Binary => ResolvedContent::Binary(bytes),
                FileEncoding::Text => match String::from_utf8(bytes) {
                    Ok(text) => ResolvedContent::Text(text),
                    Err(e) => ResolvedContent::Binary(e.into_bytes()),
                },
            };
            resolved.insert(path, content);
        }

        if !missing.is_empty() {
            missing.sort();
            return Err(SyncError::UnresolvedConflicts { paths: missing });
        }

        tracing::info!(
            "merging {source} into {target} with {} manually resolved files",
            resolved.len()
        );
        let url = match self.remote.kitchens_merge(source, target, &heads, &resolved) {
            Ok(url) => url,
            Err(e @ RemoteError::BaselineExpired { .. }) => {
                if let Err(clear) = clear_dir(&staging) {
                    tracing::warn!("could not clear {}: {clear}", staging.display());
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        clear_dir(&staging)?;
        Ok(CommitOutcome {
            url,
            resolved: resolved.into_keys().collect(),
        })
    }

    /// Fail when any local recipe of `kitchen` has changes not yet synced.
    pub fn check_local_kitchen(
        &self,
        kitchen_dir: &Path,
        kitchen: &KitchenName,
    ) -> Result<(), SyncError> {
        validate_name("kitchen", &kitchen.0)?;
        for (recipe, recipe_dir) in local_recipes(kitchen_dir)? {
            let status = self.remote.recipe_status(kitchen, &recipe, &recipe_dir)?;
            if !status.is_clean() {
                return Err(SyncError::KitchenOutOfSync {
                    recipe: recipe.to_string(),
                    path: recipe_dir,
                });
            }
        }
        Ok(())
    }

    /// Replace each local recipe of `kitchen` with a fresh copy from the
    /// remote. Returns one warning per recipe that could not be refreshed.
    pub fn refresh_local_kitchen(
        &self,
        kitchen_dir: &Path,
        kitchen: &KitchenName,
        ignore: &IgnoreRules,
    ) -> Result<Vec<String>, SyncError> {
        validate_name("kitchen", &kitchen.0)?;
        let sync = RecipeSyncOrchestrator::new(self.remote, ignore.clone());
        let options = GetOptions {
            overwrite: true,
            delete_local: true,
            assume_yes: true,
        };
        let guidance = format!(
            "close any program holding files under {} open and run recipe-get again",
            kitchen_dir.display()
        );

        let mut warnings = Vec::new();
        for (recipe, recipe_dir) in local_recipes(kitchen_dir)? {
            if let Err(e) = std::fs::remove_dir_all(&recipe_dir) {
                warnings.push(format!(
                    "could not remove {}: {e}; {guidance}",
                    recipe_dir.display()
                ));
                continue;
            }
            let always = |_: &[PathBuf], _: &[PathBuf]| true;
            match sync.get(kitchen, &recipe, kitchen_dir, options, &always) {
                Ok(outcome) if outcome.is_success() => {
                    tracing::info!("refreshed local recipe {recipe}");
                }
                Ok(outcome) => warnings.push(format!(
                    "recipe {recipe} was only partially refreshed:\n{}",
                    outcome.render()
                )),
                Err(e @ SyncError::Io { .. }) => {
                    warnings.push(format!("could not refresh {recipe}: {e}; {guidance}"))
                }
                Err(e) => warnings.push(format!("could not refresh {recipe}: {e}")),
            }
        }
        Ok(warnings)
    }
}

fn validate_kitchens(source: &KitchenName, target: &KitchenName) -> Result<(), SyncError> {
    validate_name("source kitchen", &source.0)?;
    validate_name("target kitchen", &target.0)
}

fn resolved_path(stem: &Path) -> PathBuf {
    PathBuf::from(format!("{}.resolved", stem.display()))
}

fn read_head(
    staging: &Path,
    file: &str,
    source: &KitchenName,
    target: &KitchenName,
) -> Result<ContentId, SyncError> {
    let path = staging.join(file);
    if !path.is_file() {
        return Err(SyncError::NoPreview {
            from_kitchen: source.to_string(),
            to_kitchen: target.to_string(),
        });
    }
    let bytes = read_file(&path)?;
    Ok(ContentId(String::from_utf8_lossy(&bytes).trim().to_string()))
}

/// Subdirectories of `kitchen_dir` that carry a recipe state store.
fn local_recipes(kitchen_dir: &Path) -> Result<Vec<(RecipeName, PathBuf)>, SyncError> {
    let entries = std::fs::read_dir(kitchen_dir).map_err(|e| io_err(kitchen_dir, e))?;
    let mut recipes = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(kitchen_dir, e))?;
        let path = entry.path();
        if path.is_dir() && LocalStateTracker::store_path(&path).is_file() {
            let name = entry.file_name().to_string_lossy().into_owned();
            recipes.push((RecipeName(name), path));
        }
    }
    recipes.sort();
    Ok(recipes)
}

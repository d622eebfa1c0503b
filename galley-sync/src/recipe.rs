//! Recipe-level synchronization: `get`, `update`, `status`, `file_diff`.
//!
//! ## `get`
//!
//! 1. Recipe directory missing → fetch the whole tree, write and record every
//!    file, set the baseline.
//! 2. Otherwise fetch the status and act on the merge candidates: fetched
//!    outright with `overwrite`, merged one by one through the
//!    [`FileMergeCoordinator`] without it.
//! 3. Fetch remote-only files, one `dir/*` request per minimal directory.
//! 4. With `delete_local`, remove local-only files and directories after
//!    confirmation.
//! 5. Advance the baseline only when no file failed.
//!
//! Each file's write-then-record pair is the unit of progress; failures are
//! collected per file and never roll back files already written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use galley_core::{Category, ContentId, IgnoreRules, KitchenName, RecipeName, RecipePath};
use galley_tools::{DiffToolPaths, ToolLauncher, ToolRun};

use crate::classify::StatusReport;
use crate::error::{io_err, SyncError};
use crate::merge::{has_conflict_markers, FileMergeCoordinator, MergeResult};
use crate::paths::{is_covered, minimal_paths, validate_name};
use crate::remote::{format_issues, ChangeSet, FileChange, Issue, RecipeRemote, RecipeTree};
use crate::state::{content_id_of, LocalStateTracker};
use crate::status::record_path;
use crate::writer::{clear_dir, read_file, remove_path, write_file};

// ---------------------------------------------------------------------------
// Options and outcomes
// ---------------------------------------------------------------------------

/// Asks the user before local files are deleted.
pub trait Confirm {
    /// Return true to delete `files` and `dirs`.
    fn confirm_delete(&self, files: &[PathBuf], dirs: &[PathBuf]) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&[PathBuf], &[PathBuf]) -> bool,
{
    fn confirm_delete(&self, files: &[PathBuf], dirs: &[PathBuf]) -> bool {
        self(files, dirs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Take every differing file from the remote instead of merging.
    pub overwrite: bool,
    /// Delete local-only files and directories.
    pub delete_local: bool,
    /// Skip the delete confirmation.
    pub assume_yes: bool,
}

/// What a `get` did, file by file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOutcome {
    /// The recipe directory did not exist and was fetched whole.
    pub fresh: bool,
    /// Taken from the remote with overwrite.
    pub written: Vec<RecipePath>,
    pub merged: Vec<RecipePath>,
    pub conflicted: Vec<RecipePath>,
    pub skipped_binary: Vec<RecipePath>,
    /// New or missing files fetched from the remote.
    pub fetched: Vec<RecipePath>,
    pub deleted: Vec<RecipePath>,
    /// `(path, reason)` for every file that could not be fetched or merged.
    pub failed: Vec<(String, String)>,
    pub warnings: Vec<String>,
    /// Baseline recorded at the end, when it advanced.
    pub baseline: Option<ContentId>,
}

impl GetOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for path in &self.deleted {
            lines.push(format!("deleted local item: {path}"));
        }
        if self.fresh {
            lines.push(format!("Fetched recipe with {} files", self.fetched.len()));
        } else if !self.fetched.is_empty() {
            lines.push(format!(
                "{} new or missing files from remote:",
                self.fetched.len()
            ));
            lines.extend(self.fetched.iter().map(|p| format!("\t{p}")));
        }
        for path in &self.written {
            lines.push(format!("Getting from remote '{path}'"));
        }
        for path in &self.merged {
            lines.push(format!("Auto-merging '{path}'"));
        }
        for path in &self.conflicted {
            lines.push(format!("Auto-merging '{path}'"));
            lines.push(format!("CONFLICT (content): Merge conflict in {path}"));
        }
        for path in &self.skipped_binary {
            lines.push(format!(
                "File {path} is binary, skipping file merge with remote. Use --overwrite to take the remote copy"
            ));
        }
        if !self.failed.is_empty() {
            lines.push("There was trouble getting the following files:".to_string());
            for (path, reason) in &self.failed {
                lines.push(format!("\t{path}: {reason}"));
            }
            lines.push("Use file-diff and file-merge to resolve issues.".to_string());
        }
        lines.extend(self.warnings.iter().cloned());
        if lines.is_empty() {
            return "Nothing to do".to_string();
        }
        lines.join("\n")
    }
}

/// What an `update` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// No local change was found; nothing was submitted.
    pub nothing_to_do: bool,
    pub created: Vec<RecipePath>,
    pub updated: Vec<RecipePath>,
    pub deleted: Vec<RecipePath>,
    /// Files the remote reported as not updated; retry the command.
    pub failed: Vec<RecipePath>,
    pub issues: Vec<Issue>,
    pub warnings: Vec<String>,
}

impl UpdateOutcome {
    pub fn render(&self) -> String {
        if self.nothing_to_do {
            return "No files changed.".to_string();
        }
        let list = |items: &[RecipePath]| {
            if items.is_empty() {
                "\tNone".to_string()
            } else {
                items
                    .iter()
                    .map(|p| format!("\t{p}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };
        let mut out = format!(
            "Update results:\n\nNew files:\n{}\nUpdated files:\n{}\nDeleted files:\n{}\n\nIssues:\n\n{}\n",
            list(&self.created),
            list(&self.updated),
            list(&self.deleted),
            format_issues(&self.issues)
        );
        for warning in &self.warnings {
            out.push('\n');
            out.push_str(warning);
            out.push('\n');
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct RecipeSyncOrchestrator<'a> {
    remote: &'a dyn RecipeRemote,
    ignore: IgnoreRules,
}

impl<'a> RecipeSyncOrchestrator<'a> {
    pub fn new(remote: &'a dyn RecipeRemote, ignore: IgnoreRules) -> Self {
        Self { remote, ignore }
    }

    /// Fetch and classify the status of `recipe_dir`.
    pub fn status(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        recipe_dir: &Path,
    ) -> Result<StatusReport, SyncError> {
        validate_name("kitchen", &kitchen.0)?;
        validate_name("recipe", &recipe.0)?;
        require_dir(recipe_dir)?;
        let status = self.remote.recipe_status(kitchen, recipe, recipe_dir)?;
        let mut report = StatusReport::classify(&status, recipe, &self.ignore)?;
        let tracker = LocalStateTracker::open(recipe_dir)?;
        report.conflicted = recorded_conflicts(&tracker, recipe_dir)?.0;
        Ok(report)
    }

    /// Bring `<kitchen_dir>/<recipe>` up to date with the remote.
    pub fn get(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        kitchen_dir: &Path,
        options: GetOptions,
        confirm: &dyn Confirm,
    ) -> Result<GetOutcome, SyncError> {
        validate_name("kitchen", &kitchen.0)?;
        validate_name("recipe", &recipe.0)?;
        let recipe_dir = kitchen_dir.join(&recipe.0);
        if !recipe_dir.exists() {
            return self.get_new(kitchen, recipe, &recipe_dir);
        }

        let mut tracker = LocalStateTracker::open(&recipe_dir)?;
        let status = self.remote.recipe_status(kitchen, recipe, &recipe_dir)?;
        let report = StatusReport::classify(&status, recipe, &self.ignore)?;
        let mut outcome = GetOutcome::default();

        let mut remote_ids: HashMap<RecipePath, ContentId> = HashMap::new();
        for category in [
            Category::RemoteModified,
            Category::LocalAndRemoteModified,
            Category::Different,
        ] {
            for (folder, record) in status.files(category) {
                remote_ids.insert(
                    record_path(recipe, folder, &record.filename)?,
                    record.content_id.clone(),
                );
            }
        }

        let candidates = report.merge_candidates(options.overwrite);
        if !candidates.is_empty() {
            if options.overwrite {
                let paths: Vec<String> = candidates.iter().map(|p| p.to_string()).collect();
                let written = self.fetch_into(
                    kitchen,
                    recipe,
                    &recipe_dir,
                    &mut tracker,
                    &paths,
                    &mut outcome,
                );
                outcome.written = written;
            } else {
                self.merge_files(
                    kitchen,
                    recipe,
                    &recipe_dir,
                    &mut tracker,
                    &candidates,
                    &remote_ids,
                    &mut outcome,
                );
            }
        }

        if !report.only_remote.is_empty() || !report.only_remote_dirs.is_empty() {
            let dirs = minimal_paths(&report.only_remote_dirs);
            let mut paths: Vec<String> = dirs.iter().map(|d| format!("{d}/*")).collect();
            paths.extend(
                report
                    .only_remote
                    .iter()
                    .filter(|f| !is_covered(f, &dirs))
                    .map(|f| f.to_string()),
            );
            let fetched =
                self.fetch_into(kitchen, recipe, &recipe_dir, &mut tracker, &paths, &mut outcome);
            outcome.fetched = fetched;
        }

        if options.delete_local {
            self.delete_local(&report, &recipe_dir, &mut tracker, options, confirm, &mut outcome)?;
        }

        if outcome.is_success() {
            if let Some(head) = status.recipe_sha {
                tracker.set_baseline(head.clone())?;
                outcome.baseline = Some(head);
            }
        }
        Ok(outcome)
    }

    fn get_new(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        recipe_dir: &Path,
    ) -> Result<GetOutcome, SyncError> {
        let tree = self.remote.get_recipe(kitchen, recipe, None)?;
        std::fs::create_dir_all(recipe_dir).map_err(|e| io_err(recipe_dir, e))?;
        let mut tracker = LocalStateTracker::open(recipe_dir)?;
        let mut outcome = GetOutcome {
            fresh: true,
            ..GetOutcome::default()
        };
        outcome.fetched = write_tree(&tree, recipe, recipe_dir, &mut tracker, &mut outcome.failed);
        if outcome.is_success() {
            tracker.set_baseline(tree.baseline_id.clone())?;
            outcome.baseline = Some(tree.baseline_id);
        }
        tracing::info!(
            "fetched {} files of {recipe} from {kitchen}",
            outcome.fetched.len()
        );
        Ok(outcome)
    }

    /// Request `paths` and write what comes back; request failure fails every path.
    fn fetch_into(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        recipe_dir: &Path,
        tracker: &mut LocalStateTracker,
        paths: &[String],
        outcome: &mut GetOutcome,
    ) -> Vec<RecipePath> {
        match self.remote.get_recipe(kitchen, recipe, Some(paths)) {
            Ok(tree) => write_tree(&tree, recipe, recipe_dir, tracker, &mut outcome.failed),
            Err(e) => {
                let reason = e.to_string();
                outcome
                    .failed
                    .extend(paths.iter().map(|p| (p.clone(), reason.clone())));
                Vec::new()
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_files(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        recipe_dir: &Path,
        tracker: &mut LocalStateTracker,
        candidates: &[RecipePath],
        remote_ids: &HashMap<RecipePath, ContentId>,
        outcome: &mut GetOutcome,
    ) {
        let Some(baseline) = tracker.baseline().cloned() else {
            for path in candidates {
                outcome.failed.push((
                    path.to_string(),
                    "no baseline recorded for this recipe; use --overwrite".to_string(),
                ));
            }
            return;
        };
        let coordinator = FileMergeCoordinator::new(self.remote);

        for path in candidates {
            let fs_path = path.to_fs_path(recipe_dir);
            let result = read_file(&fs_path).and_then(|local| {
                coordinator.merge(kitchen, recipe, path, &local, &baseline)
            });
            let applied = match result {
                Ok(MergeResult::SkippedBinary) => {
                    outcome.skipped_binary.push(path.clone());
                    continue;
                }
                Ok(MergeResult::Merged(text)) => {
                    apply_merge(&fs_path, path, &text, remote_ids.get(path), tracker, false)
                        .map(|()| outcome.merged.push(path.clone()))
                }
                Ok(MergeResult::Conflicted(text)) => {
                    apply_merge(&fs_path, path, &text, remote_ids.get(path), tracker, true)
                        .map(|()| outcome.conflicted.push(path.clone()))
                }
                Err(e) => Err(e),
            };
            if let Err(e) = applied {
                tracing::warn!("merge of {path} failed: {e}");
                outcome.failed.push((path.to_string(), e.to_string()));
            }
        }
    }

    fn delete_local(
        &self,
        report: &StatusReport,
        recipe_dir: &Path,
        tracker: &mut LocalStateTracker,
        options: GetOptions,
        confirm: &dyn Confirm,
        outcome: &mut GetOutcome,
    ) -> Result<(), SyncError> {
        let dirs = minimal_paths(&report.only_local_dirs);
        let files: Vec<&RecipePath> = report
            .only_local
            .iter()
            .filter(|f| !is_covered(f, &dirs))
            .collect();
        if files.is_empty() && dirs.is_empty() {
            return Ok(());
        }

        let file_paths: Vec<PathBuf> = files.iter().map(|f| f.to_fs_path(recipe_dir)).collect();
        let dir_paths: Vec<PathBuf> = dirs.iter().map(|d| d.to_fs_path(recipe_dir)).collect();
        if !options.assume_yes && !confirm.confirm_delete(&file_paths, &dir_paths) {
            outcome
                .warnings
                .push("Skipping deletion of local items.".to_string());
            return Ok(());
        }

        let targets = files.into_iter().zip(file_paths).chain(dirs.iter().zip(dir_paths));
        for (path, fs_path) in targets {
            match remove_path(&fs_path) {
                Ok(()) => {
                    tracker.forget(path)?;
                    outcome.deleted.push(path.clone());
                }
                Err(e) => {
                    tracing::warn!("could not delete {}: {e}", fs_path.display());
                    outcome
                        .warnings
                        .push(format!("could not delete {}: {e}", fs_path.display()));
                }
            }
        }
        Ok(())
    }

    /// Push local changes to the remote in one batch.
    ///
    /// Refused while a file recorded as conflicted still carries all three
    /// conflict markers; conflicts edited away since are cleared first.
    pub fn update(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        recipe_dir: &Path,
        message: &str,
        delete_remote: bool,
    ) -> Result<UpdateOutcome, SyncError> {
        validate_name("kitchen", &kitchen.0)?;
        validate_name("recipe", &recipe.0)?;
        require_dir(recipe_dir)?;

        let mut tracker = LocalStateTracker::open(recipe_dir)?;
        let (unresolved, resolved) = recorded_conflicts(&tracker, recipe_dir)?;
        if !unresolved.is_empty() {
            return Err(SyncError::ConflictMarkers {
                paths: unresolved.iter().map(|p| p.to_string()).collect(),
            });
        }
        for path in &resolved {
            tracing::debug!("conflict in {path} resolved locally");
            tracker.clear_conflict(path)?;
        }

        let status = self.remote.recipe_status(kitchen, recipe, recipe_dir)?;
        let report = StatusReport::classify(&status, recipe, &self.ignore)?;
        let remote_changes = report.remote_changes();
        if !remote_changes.is_empty() {
            return Err(SyncError::RemoteChanged {
                files: remote_changes.iter().map(|p| p.to_string()).collect(),
            });
        }

        let mut outcome = UpdateOutcome::default();
        let changes = self.build_changes(&report, recipe_dir, delete_remote)?;
        remove_empty_dirs(&report.only_local_dirs, recipe_dir, &mut outcome.warnings);

        if changes.is_empty() {
            outcome.nothing_to_do = true;
            return Ok(outcome);
        }

        let response = self.remote.update_files(kitchen, recipe, message, &changes)?;
        if response.has_errors() {
            return Err(SyncError::UpdateRejected {
                report: format_issues(&response.issues),
            });
        }

        for (path, bytes) in &response.formatted_files {
            if let Err(e) = write_file(&path.to_fs_path(recipe_dir), bytes) {
                outcome
                    .warnings
                    .push(format!("could not write formatted {path}: {e}"));
            }
        }

        for (path, ok) in &response.results {
            if !ok {
                outcome.failed.push(path.clone());
                continue;
            }
            match changes.get(path) {
                Some(FileChange::Upsert { is_new, .. }) => {
                    let bytes = read_file(&path.to_fs_path(recipe_dir))?;
                    tracker.record(path, content_id_of(&bytes))?;
                    tracker.clear_conflict(path)?;
                    if *is_new {
                        outcome.created.push(path.clone());
                    } else {
                        outcome.updated.push(path.clone());
                    }
                }
                Some(FileChange::Delete) => {
                    tracker.forget(path)?;
                    outcome.deleted.push(path.clone());
                }
                None => tracing::debug!("remote reported a result for unsent {path}"),
            }
        }

        if !outcome.failed.is_empty() {
            let mut warning = "The following files could not be updated, please try this command again to complete the update:".to_string();
            for path in &outcome.failed {
                warning.push_str(&format!("\n\t{path}"));
            }
            outcome.warnings.push(warning);
        }
        if let Some(head) = response.recipe_sha {
            tracker.set_baseline(head)?;
        }
        outcome.issues = response.issues;
        Ok(outcome)
    }

    fn build_changes(
        &self,
        report: &StatusReport,
        recipe_dir: &Path,
        delete_remote: bool,
    ) -> Result<ChangeSet, SyncError> {
        let mut changes = ChangeSet::new();
        let mut upsert = |path: &RecipePath, is_new: bool| -> Result<(), SyncError> {
            let fs_path = path.to_fs_path(recipe_dir);
            if fs_path.is_file() {
                let contents = read_file(&fs_path)?;
                changes.insert(path.clone(), FileChange::Upsert { contents, is_new });
            }
            Ok(())
        };

        for path in report.local_modified.iter().chain(&report.different) {
            upsert(path, false)?;
        }
        for path in &report.only_local {
            upsert(path, true)?;
        }
        for dir in &report.only_local_dirs {
            for path in self.files_under(recipe_dir, dir)? {
                upsert(&path, true)?;
            }
        }
        if delete_remote {
            for path in &report.only_remote {
                if !path.to_fs_path(recipe_dir).is_file() {
                    changes.insert(path.clone(), FileChange::Delete);
                }
            }
        }
        Ok(changes)
    }

    /// Every non-ignored file under `dir`, recipe-relative.
    fn files_under(&self, recipe_dir: &Path, dir: &RecipePath) -> Result<Vec<RecipePath>, SyncError> {
        let root = dir.to_fs_path(recipe_dir);
        let mut out = Vec::new();
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.ignore.ignores(&e.file_name().to_string_lossy()));
        for entry in walker {
            let entry = entry.map_err(|e| {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                io_err(&root, source)
            })?;
            if entry.file_type().is_file() {
                out.push(RecipePath::from_fs_path(recipe_dir, entry.path())?);
            }
        }
        Ok(out)
    }

    /// Fetch the remote copy of `path` into `diff_root` and run the diff tool.
    pub fn file_diff(
        &self,
        kitchen: &KitchenName,
        recipe: &RecipeName,
        recipe_dir: &Path,
        path: &RecipePath,
        diff_root: &Path,
        launcher: &ToolLauncher,
    ) -> Result<ToolRun, SyncError> {
        validate_name("kitchen", &kitchen.0)?;
        validate_name("recipe", &recipe.0)?;
        let tree = self
            .remote
            .get_recipe(kitchen, recipe, Some(&[path.to_string()]))?;
        let remote_file = tree
            .files()
            .find(|(folder, file)| {
                record_path(recipe, folder, &file.filename).is_ok_and(|p| &p == path)
            })
            .map(|(_, file)| file)
            .ok_or_else(|| SyncError::InvalidParameter {
                name: "file path",
                reason: format!("'{path}' does not exist in {kitchen}/{recipe}"),
            })?;

        clear_dir(diff_root)?;
        let remote_copy = path.to_fs_path(&diff_root.join(&kitchen.0).join(&recipe.0));
        write_file(&remote_copy, &remote_file.content)?;

        let paths = DiffToolPaths {
            local: path.to_fs_path(recipe_dir),
            remote: remote_copy,
        };
        Ok(launcher.run_diff(&paths)?)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Recorded conflicts split into files still carrying every conflict marker
/// and files edited or removed since.
fn recorded_conflicts(
    tracker: &LocalStateTracker,
    recipe_dir: &Path,
) -> Result<(Vec<RecipePath>, Vec<RecipePath>), SyncError> {
    let mut unresolved = Vec::new();
    let mut resolved = Vec::new();
    for raw in tracker.conflicts() {
        let path = RecipePath::parse(raw)?;
        let fs_path = path.to_fs_path(recipe_dir);
        let marked = fs_path.is_file()
            && has_conflict_markers(&String::from_utf8_lossy(&read_file(&fs_path)?));
        if marked {
            unresolved.push(path);
        } else {
            resolved.push(path);
        }
    }
    Ok((unresolved, resolved))
}

fn require_dir(recipe_dir: &Path) -> Result<(), SyncError> {
    if recipe_dir.is_dir() {
        Ok(())
    } else {
        Err(SyncError::RecipeNotFound {
            path: recipe_dir.to_path_buf(),
        })
    }
}

/// Write every file of `tree` and record the content id the remote reported
/// for it; returns the written paths, sorted.
fn write_tree(
    tree: &RecipeTree,
    recipe: &RecipeName,
    recipe_dir: &Path,
    tracker: &mut LocalStateTracker,
    failed: &mut Vec<(String, String)>,
) -> Vec<RecipePath> {
    let mut written = Vec::new();
    for (folder, file) in tree.files() {
        let path = match record_path(recipe, folder, &file.filename) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("skipping {folder}/{}: {e}", file.filename);
                failed.push((format!("{folder}/{}", file.filename), e.to_string()));
                continue;
            }
        };
        // The file stays on disk when recording fails; the path is still
        // reported as failed so the baseline is not advanced.
        let result = write_file(&path.to_fs_path(recipe_dir), &file.content)
            .and_then(|()| tracker.record(&path, file.content_id.clone()))
            .and_then(|()| tracker.clear_conflict(&path));
        match result {
            Ok(()) => written.push(path),
            Err(e) => {
                tracing::warn!("could not write {path}: {e}");
                failed.push((path.to_string(), e.to_string()));
            }
        }
    }
    written.sort();
    written
}

/// Write merged text. The recorded id is the remote one, so local edits kept
/// by the merge still show as local changes.
fn apply_merge(
    fs_path: &Path,
    path: &RecipePath,
    text: &str,
    remote_id: Option<&ContentId>,
    tracker: &mut LocalStateTracker,
    conflicted: bool,
) -> Result<(), SyncError> {
    write_file(fs_path, text.as_bytes())?;
    let id = remote_id
        .cloned()
        .unwrap_or_else(|| content_id_of(text.as_bytes()));
    tracker.record(path, id)?;
    if conflicted {
        tracker.mark_conflicted(path)
    } else {
        tracker.clear_conflict(path)
    }
}

fn remove_empty_dirs(dirs: &[RecipePath], recipe_dir: &Path, warnings: &mut Vec<String>) {
    for dir in dirs {
        let fs_path = dir.to_fs_path(recipe_dir);
        let empty = std::fs::read_dir(&fs_path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty {
            continue;
        }
        match std::fs::remove_dir(&fs_path) {
            Ok(()) => tracing::info!("removed empty local directory: {}", fs_path.display()),
            Err(e) => warnings.push(format!(
                "could not remove empty directory {}: {e}",
                fs_path.display()
            )),
        }
    }
}

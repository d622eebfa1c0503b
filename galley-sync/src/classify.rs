//! Sorted, recipe-relative view of a [`RecipeStatus`].

use std::collections::BTreeSet;

use galley_core::types::strip_recipe_root;
use galley_core::{Category, IgnoreRules, RecipeName, RecipePath, RecipeStatus};

use crate::error::SyncError;
use crate::status::record_path;

/// Partition of a recipe status with the recipe segment stripped.
///
/// Every list is sorted and duplicate-free.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub recipe: RecipeName,
    pub local_modified: Vec<RecipePath>,
    pub remote_modified: Vec<RecipePath>,
    pub local_and_remote_modified: Vec<RecipePath>,
    pub different: Vec<RecipePath>,
    pub only_local: Vec<RecipePath>,
    pub only_local_dirs: Vec<RecipePath>,
    pub only_remote: Vec<RecipePath>,
    pub only_remote_dirs: Vec<RecipePath>,
    /// Files a merge left with conflict markers. Filled from the local state
    /// store by the orchestrator; `classify` leaves it empty.
    pub conflicted: Vec<RecipePath>,
    pub unchanged: usize,
}

impl StatusReport {
    /// Build the report. Directory entries whose name matches `ignore` are
    /// dropped; an empty file list under `only_local`/`only_remote` counts as a
    /// directory.
    pub fn classify(
        status: &RecipeStatus,
        recipe: &RecipeName,
        ignore: &IgnoreRules,
    ) -> Result<Self, SyncError> {
        status.validate()?;

        let files = |category| -> Result<Vec<RecipePath>, SyncError> {
            let mut out = BTreeSet::new();
            for (folder, record) in status.files(category) {
                out.insert(record_path(recipe, folder, &record.filename)?);
            }
            Ok(out.into_iter().collect())
        };
        let dirs = |categories: &[Category]| -> Result<Vec<RecipePath>, SyncError> {
            let mut out = BTreeSet::new();
            for category in categories {
                for (folder, records) in status.category(*category) {
                    if !category.is_directory() && !records.is_empty() {
                        continue;
                    }
                    let Some(dir) = strip_recipe_root(&recipe.0, folder)? else {
                        continue;
                    };
                    if !ignore.ignores(dir.file_name()) {
                        out.insert(dir);
                    }
                }
            }
            Ok(out.into_iter().collect())
        };

        Ok(Self {
            recipe: recipe.clone(),
            local_modified: files(Category::LocalModified)?,
            remote_modified: files(Category::RemoteModified)?,
            local_and_remote_modified: files(Category::LocalAndRemoteModified)?,
            different: files(Category::Different)?,
            only_local: files(Category::OnlyLocal)?,
            only_local_dirs: dirs(&[Category::OnlyLocal, Category::OnlyLocalDir])?,
            only_remote: files(Category::OnlyRemote)?,
            only_remote_dirs: dirs(&[Category::OnlyRemote, Category::OnlyRemoteDir])?,
            conflicted: Vec::new(),
            unchanged: status.files(Category::Same).count(),
        })
    }

    /// Nothing to push or pull.
    pub fn is_clean(&self) -> bool {
        self.local_modified.is_empty()
            && self.remote_modified.is_empty()
            && self.local_and_remote_modified.is_empty()
            && self.different.is_empty()
            && self.only_local.is_empty()
            && self.only_local_dirs.is_empty()
            && self.only_remote.is_empty()
            && self.only_remote_dirs.is_empty()
            && self.conflicted.is_empty()
    }

    /// Files changed on the remote since the last sync.
    pub fn remote_changes(&self) -> Vec<RecipePath> {
        let mut out: Vec<_> = self
            .remote_modified
            .iter()
            .chain(&self.local_and_remote_modified)
            .cloned()
            .collect();
        out.sort();
        out
    }

    /// Files the `get` flow acts upon.
    ///
    /// With `overwrite` every differing file is taken from the remote;
    /// otherwise local-only edits are left alone and the rest are merged.
    pub fn merge_candidates(&self, overwrite: bool) -> Vec<RecipePath> {
        let mut out: Vec<RecipePath> = Vec::new();
        if overwrite {
            out.extend(self.local_modified.iter().cloned());
        }
        out.extend(self.remote_modified.iter().cloned());
        out.extend(self.local_and_remote_modified.iter().cloned());
        out.extend(self.different.iter().cloned());
        out.sort();
        out.dedup();
        out
    }

    /// Human summary, one block per non-empty list.
    pub fn render(&self) -> String {
        let mut blocks = Vec::new();
        let sections: [(&str, &[RecipePath]); 9] = [
            ("files have unresolved conflict markers", self.conflicted.as_slice()),
            ("files are modified on local", self.local_modified.as_slice()),
            ("files are modified on remote", self.remote_modified.as_slice()),
            (
                "files are modified on both local and remote",
                self.local_and_remote_modified.as_slice(),
            ),
            ("files differ with no common base", self.different.as_slice()),
            ("files are local only", self.only_local.as_slice()),
            ("directories are local only", self.only_local_dirs.as_slice()),
            ("files are remote only", self.only_remote.as_slice()),
            ("directories are remote only", self.only_remote_dirs.as_slice()),
        ];
        for (label, items) in sections {
            if items.is_empty() {
                continue;
            }
            let mut block = format!("{} {label}:\n", items.len());
            for item in items {
                block.push_str(&format!("\t{item}\n"));
            }
            blocks.push(block);
        }
        if self.unchanged > 0 {
            blocks.push(format!("{} files are unchanged\n", self.unchanged));
        }
        if blocks.is_empty() {
            return "Nothing to report\n".to_string();
        }
        blocks.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_core::FileRecord;

    fn p(raw: &str) -> RecipePath {
        RecipePath::parse(raw).unwrap()
    }

    fn sample() -> RecipeStatus {
        let mut s = RecipeStatus::default();
        s.push(Category::Same, "demo", FileRecord::new("a.txt", "1"));
        s.push(Category::Same, "demo/res", FileRecord::new("c.txt", "1"));
        s.push(Category::RemoteModified, "demo/res", FileRecord::new("z.txt", "2"));
        s.push(Category::RemoteModified, "demo", FileRecord::new("b.txt", "2"));
        s.push(Category::LocalModified, "demo", FileRecord::new("l.txt", "3"));
        s.push(Category::Different, "demo", FileRecord::new("d.txt", "4"));
        s.push(Category::OnlyLocal, "demo/new", FileRecord::new("n.txt", "5"));
        s.push_dir(Category::OnlyLocalDir, "demo/new");
        s.push_dir(Category::OnlyLocalDir, "demo/__pycache__");
        s.push_dir(Category::OnlyRemote, "demo/remote_dir");
        s
    }

    fn classify() -> StatusReport {
        StatusReport::classify(&sample(), &RecipeName::from("demo"), &IgnoreRules::default())
            .unwrap()
    }

    #[test]
    fn lists_are_sorted_and_stripped() {
        let report = classify();
        assert_eq!(report.remote_modified, vec![p("b.txt"), p("res/z.txt")]);
        assert_eq!(report.only_local, vec![p("new/n.txt")]);
        assert_eq!(report.unchanged, 2);
    }

    #[test]
    fn empty_only_remote_entry_is_a_directory() {
        let report = classify();
        assert!(report.only_remote.is_empty());
        assert_eq!(report.only_remote_dirs, vec![p("remote_dir")]);
    }

    #[test]
    fn ignored_directories_are_dropped() {
        assert_eq!(classify().only_local_dirs, vec![p("new")]);
    }

    #[test]
    fn classification_is_deterministic() {
        assert_eq!(classify(), classify());
    }

    #[test]
    fn merge_candidates_depend_on_overwrite() {
        let report = classify();
        assert_eq!(
            report.merge_candidates(false),
            vec![p("b.txt"), p("d.txt"), p("res/z.txt")]
        );
        assert_eq!(
            report.merge_candidates(true),
            vec![p("b.txt"), p("d.txt"), p("l.txt"), p("res/z.txt")]
        );
    }

    #[test]
    fn render_summarises_each_list() {
        let text = classify().render();
        assert!(text.contains("2 files are modified on remote:\n\tb.txt\n\tres/z.txt\n"));
        assert!(text.contains("1 directories are remote only:\n\tremote_dir\n"));
        assert!(text.ends_with("2 files are unchanged\n"));
    }

    #[test]
    fn render_lists_conflicts_first() {
        let mut report = classify();
        report.conflicted = vec![p("b.txt")];
        let text = report.render();
        assert!(text.starts_with("1 files have unresolved conflict markers:\n\tb.txt\n"));
    }

    #[test]
    fn foreign_folder_keys_are_rejected() {
        let mut status = sample();
        status.push(Category::OnlyRemote, "other/res", FileRecord::new("x.txt", "1"));
        assert!(matches!(
            StatusReport::classify(&status, &RecipeName::from("demo"), &IgnoreRules::default()),
            Err(SyncError::Path(_))
        ));
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let mut status = sample();
        status.push(Category::LocalModified, "demo", FileRecord::new("a.txt", "9"));
        assert!(matches!(
            StatusReport::classify(&status, &RecipeName::from("demo"), &IgnoreRules::default()),
            Err(SyncError::Status(_))
        ));
    }
}

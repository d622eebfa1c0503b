//! `galley recipe-status`, `recipe-get` and `recipe-update`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use galley_core::RecipePath;
use galley_sync::{Confirm, GetOptions, RecipeSyncOrchestrator, StatusReport};

use super::RecipeTarget;
use crate::context::AppContext;

// ---------------------------------------------------------------------------
// recipe-status
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct RecipeStatusArgs {
    #[command(flatten)]
    pub target: RecipeTarget,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl RecipeStatusArgs {
    pub fn run(self) -> Result<()> {
        let ctx = AppContext::load()?;
        let remote = ctx.remote()?;
        let sync = RecipeSyncOrchestrator::new(&remote, ctx.ignore.clone());
        let report = sync
            .status(
                &self.target.kitchen(),
                &self.target.recipe(),
                &self.target.recipe_dir(),
            )
            .with_context(|| {
                format!(
                    "status failed for {}/{}",
                    self.target.kitchen, self.target.recipe
                )
            })?;

        if self.json {
            let payload = StatusJson::from(&report);
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_status(&self.target, &report);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson {
    recipe: String,
    clean: bool,
    unchanged: usize,
    local_modified: Vec<String>,
    remote_modified: Vec<String>,
    local_and_remote_modified: Vec<String>,
    different: Vec<String>,
    only_local: Vec<String>,
    only_local_dirs: Vec<String>,
    only_remote: Vec<String>,
    only_remote_dirs: Vec<String>,
    conflicted: Vec<String>,
}

impl From<&StatusReport> for StatusJson {
    fn from(report: &StatusReport) -> Self {
        fn names(paths: &[RecipePath]) -> Vec<String> {
            paths.iter().map(|p| p.to_string()).collect()
        }
        Self {
            recipe: report.recipe.to_string(),
            clean: report.is_clean(),
            unchanged: report.unchanged,
            local_modified: names(&report.local_modified),
            remote_modified: names(&report.remote_modified),
            local_and_remote_modified: names(&report.local_and_remote_modified),
            different: names(&report.different),
            only_local: names(&report.only_local),
            only_local_dirs: names(&report.only_local_dirs),
            only_remote: names(&report.only_remote),
            only_remote_dirs: names(&report.only_remote_dirs),
            conflicted: names(&report.conflicted),
        }
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "path")]
    path: String,
}

fn status_rows(report: &StatusReport) -> Vec<StatusRow> {
    let sections: [(String, &[RecipePath], bool); 9] = [
        ("CONFLICT".red().bold().to_string(), report.conflicted.as_slice(), false),
        ("LOCAL".yellow().bold().to_string(), report.local_modified.as_slice(), false),
        ("REMOTE".cyan().bold().to_string(), report.remote_modified.as_slice(), false),
        ("BOTH".red().bold().to_string(), report.local_and_remote_modified.as_slice(), false),
        ("DIFFERENT".red().to_string(), report.different.as_slice(), false),
        ("LOCAL ONLY".green().to_string(), report.only_local.as_slice(), false),
        ("LOCAL ONLY".green().to_string(), report.only_local_dirs.as_slice(), true),
        ("REMOTE ONLY".magenta().to_string(), report.only_remote.as_slice(), false),
        ("REMOTE ONLY".magenta().to_string(), report.only_remote_dirs.as_slice(), true),
    ];
    let mut rows = Vec::new();
    for (label, paths, is_dir) in sections {
        for path in paths {
            rows.push(StatusRow {
                state: label.clone(),
                path: if is_dir {
                    format!("{path}/")
                } else {
                    path.to_string()
                },
            });
        }
    }
    rows
}

fn print_status(target: &RecipeTarget, report: &StatusReport) {
    println!(
        "{}/{} | {} unchanged files",
        target.kitchen.bold(),
        target.recipe.bold(),
        report.unchanged
    );
    if report.is_clean() {
        println!("{}", "Recipe is up to date.".green().bold());
        return;
    }
    let mut table = Table::new(status_rows(report));
    table.with(Style::rounded());
    println!("{table}");

    if !report.conflicted.is_empty() {
        println!(
            "Remove the conflict markers from the files above, then run 'galley recipe-update'."
        );
    } else if !report.remote_changes().is_empty() {
        println!("Run 'galley recipe-get' to bring in remote changes.");
    } else {
        println!("Run 'galley recipe-update' to push local changes.");
    }
}

// ---------------------------------------------------------------------------
// recipe-get
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct RecipeGetArgs {
    #[command(flatten)]
    pub target: RecipeTarget,

    /// Take every differing file from the remote instead of merging.
    #[arg(long)]
    pub overwrite: bool,

    /// Delete files and directories that exist only locally.
    #[arg(long)]
    pub delete_local: bool,

    /// Do not ask before deleting local items.
    #[arg(short, long)]
    pub yes: bool,
}

/// Asks on the terminal before local items are deleted.
struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm_delete(&self, files: &[PathBuf], dirs: &[PathBuf]) -> bool {
        println!("The following local items will be deleted:");
        for path in dirs.iter().chain(files) {
            println!("\t{}", path.display());
        }
        dialoguer::Confirm::new()
            .with_prompt("Delete them?")
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

impl RecipeGetArgs {
    pub fn run(self) -> Result<()> {
        let ctx = AppContext::load()?;
        let remote = ctx.remote()?;
        let sync = RecipeSyncOrchestrator::new(&remote, ctx.ignore.clone());
        let options = GetOptions {
            overwrite: self.overwrite,
            delete_local: self.delete_local,
            assume_yes: self.yes,
        };
        let outcome = sync
            .get(
                &self.target.kitchen(),
                &self.target.recipe(),
                &self.target.kitchen_dir,
                options,
                &PromptConfirm,
            )
            .with_context(|| {
                format!(
                    "recipe-get failed for {}/{}",
                    self.target.kitchen, self.target.recipe
                )
            })?;

        println!("{}", outcome.render());
        if !outcome.is_success() {
            bail!(
                "{} files could not be fetched or merged",
                outcome.failed.len()
            );
        }
        if !outcome.conflicted.is_empty() {
            println!(
                "{}",
                format!(
                    "{} files have conflicts; fix them and run recipe-update.",
                    outcome.conflicted.len()
                )
                .yellow()
                .bold()
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// recipe-update
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct RecipeUpdateArgs {
    #[command(flatten)]
    pub target: RecipeTarget,

    /// Message recorded with the update.
    #[arg(short, long, default_value = "Updated from galley")]
    pub message: String,

    /// Delete remote files that no longer exist locally.
    #[arg(long)]
    pub delete_remote: bool,
}

impl RecipeUpdateArgs {
    pub fn run(self) -> Result<()> {
        let ctx = AppContext::load()?;
        let remote = ctx.remote()?;
        let sync = RecipeSyncOrchestrator::new(&remote, ctx.ignore.clone());
        let outcome = sync
            .update(
                &self.target.kitchen(),
                &self.target.recipe(),
                &self.target.recipe_dir(),
                &self.message,
                self.delete_remote,
            )
            .with_context(|| {
                format!(
                    "recipe-update failed for {}/{}",
                    self.target.kitchen, self.target.recipe
                )
            })?;
        println!("{}", outcome.render());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_core::RecipeName;

    fn p(raw: &str) -> RecipePath {
        RecipePath::parse(raw).unwrap()
    }

    #[test]
    fn status_rows_mark_directories() {
        let report = StatusReport {
            recipe: RecipeName::from("demo"),
            remote_modified: vec![p("b.txt")],
            only_local_dirs: vec![p("res")],
            ..StatusReport::default()
        };
        let rows = status_rows(&report);
        let paths: Vec<&str> = rows.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["b.txt", "res/"]);
    }

    #[test]
    fn status_json_lists_paths() {
        let report = StatusReport {
            recipe: RecipeName::from("demo"),
            local_modified: vec![p("a.txt")],
            unchanged: 2,
            ..StatusReport::default()
        };
        let value = serde_json::to_value(StatusJson::from(&report)).unwrap();
        assert_eq!(value["clean"], serde_json::json!(false));
        assert_eq!(value["local_modified"], serde_json::json!(["a.txt"]));
        assert_eq!(value["unchanged"], serde_json::json!(2));
        assert_eq!(value["conflicted"], serde_json::json!([]));
    }

    #[test]
    fn conflicts_are_listed_first() {
        let report = StatusReport {
            recipe: RecipeName::from("demo"),
            local_modified: vec![p("a.txt"), p("b.txt")],
            conflicted: vec![p("b.txt")],
            ..StatusReport::default()
        };
        let rows = status_rows(&report);
        assert_eq!(rows[0].path, "b.txt");
        assert!(rows[0].state.contains("CONFLICT"));
        assert_eq!(rows.len(), 3);
    }
}

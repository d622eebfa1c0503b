//! `galley file-diff`, `file-merge` and `file-resolve`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use galley_core::RecipePath;
use galley_sync::{KitchenMergeOrchestrator, RecipeSyncOrchestrator};
use galley_tools::ToolRun;

use super::{MergePair, RecipeTarget};
use crate::context::AppContext;

fn parse_path(raw: &str) -> Result<RecipePath> {
    RecipePath::parse(raw).with_context(|| format!("invalid file path '{raw}'"))
}

fn report_tool(tool: &str, run: &ToolRun) {
    tracing::debug!(command = %run.command, "{tool} tool finished");
    if !run.status.success() {
        println!(
            "{} {tool} tool exited with {}",
            "note:".yellow().bold(),
            run.status
        );
    }
}

// ---------------------------------------------------------------------------
// file-diff
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct FileDiffArgs {
    #[command(flatten)]
    pub target: RecipeTarget,

    /// Recipe-relative path of the file to compare.
    pub file_path: String,
}

impl FileDiffArgs {
    pub fn run(self) -> Result<()> {
        let ctx = AppContext::load()?;
        let path = parse_path(&self.file_path)?;
        let launcher = ctx.launcher()?;
        let remote = ctx.remote()?;
        let sync = RecipeSyncOrchestrator::new(&remote, ctx.ignore.clone());
        let run = sync
            .file_diff(
                &self.target.kitchen(),
                &self.target.recipe(),
                &self.target.recipe_dir(),
                &path,
                &ctx.diff_dir(),
                &launcher,
            )
            .with_context(|| format!("file-diff failed for '{path}'"))?;
        report_tool("diff", &run);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// file-merge
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct FileMergeArgs {
    #[command(flatten)]
    pub pair: MergePair,

    /// Path as listed in the merge preview results.
    pub file_path: String,
}

impl FileMergeArgs {
    pub fn run(self) -> Result<()> {
        let ctx = AppContext::load()?;
        let path = parse_path(&self.file_path)?;
        let launcher = ctx.launcher()?;
        let remote = ctx.remote()?;
        let merge = KitchenMergeOrchestrator::new(&remote, ctx.merge_dir());
        let run = merge
            .file_merge(&self.pair.source(), &self.pair.target(), &path, &launcher)
            .with_context(|| format!("file-merge failed for '{path}'"))?;
        report_tool("merge", &run);
        println!(
            "When the merge looks right run 'galley file-resolve --source-kitchen {} --target-kitchen {} {path}'",
            self.pair.source_kitchen, self.pair.target_kitchen
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// file-resolve
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct FileResolveArgs {
    #[command(flatten)]
    pub pair: MergePair,

    /// Path as listed in the merge preview results.
    pub file_path: String,
}

impl FileResolveArgs {
    pub fn run(self) -> Result<()> {
        let ctx = AppContext::load()?;
        let path = parse_path(&self.file_path)?;
        let remote = ctx.remote()?;
        let merge = KitchenMergeOrchestrator::new(&remote, ctx.merge_dir());
        let resolved = merge
            .file_resolve(&self.pair.source(), &self.pair.target(), &path)
            .with_context(|| format!("file-resolve failed for '{path}'"))?;
        println!(
            "{} {path} ({})",
            "Resolved".green().bold(),
            resolved.display()
        );
        Ok(())
    }
}

//! `galley kitchen-merge-preview` and `kitchen-merge`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use galley_sync::KitchenMergeOrchestrator;

use super::MergePair;
use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct KitchenMergePreviewArgs {
    #[command(flatten)]
    pub pair: MergePair,

    /// Discard earlier resolutions and restage every conflict.
    #[arg(long)]
    pub clean: bool,

    /// Directory holding local kitchen checkouts; the target kitchen found
    /// there must have no unsynced changes.
    #[arg(long)]
    pub kitchens_root: Option<PathBuf>,
}

impl KitchenMergePreviewArgs {
    pub fn run(self) -> Result<()> {
        let ctx = AppContext::load()?;
        let remote = ctx.remote()?;
        let merge = KitchenMergeOrchestrator::new(&remote, ctx.merge_dir());
        let (source, target) = (self.pair.source(), self.pair.target());

        if let Some(root) = &self.kitchens_root {
            let local = root.join(&target.0);
            if local.is_dir() {
                merge.check_local_kitchen(&local, &target)?;
            } else {
                tracing::debug!(path = %local.display(), "no local checkout of target kitchen");
            }
        }

        let outcome = merge
            .preview(&source, &target, self.clean)
            .with_context(|| format!("kitchen-merge-preview failed for {source} -> {target}"))?;
        print!("{}", outcome.render(&source, &target));

        let conflicts = outcome.conflicts().count();
        if conflicts > 0 {
            println!(
                "{}",
                format!(
                    "{conflicts} conflicts staged in {}",
                    outcome.staging_dir.display()
                )
                .yellow()
                .bold()
            );
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct KitchenMergeArgs {
    #[command(flatten)]
    pub pair: MergePair,

    /// Directory holding local kitchen checkouts; the target kitchen found
    /// there is refreshed after the merge.
    #[arg(long)]
    pub kitchens_root: Option<PathBuf>,
}

impl KitchenMergeArgs {
    pub fn run(self) -> Result<()> {
        let ctx = AppContext::load()?;
        let remote = ctx.remote()?;
        let merge = KitchenMergeOrchestrator::new(&remote, ctx.merge_dir());
        let (source, target) = (self.pair.source(), self.pair.target());

        let outcome = merge
            .commit(&source, &target)
            .with_context(|| format!("kitchen-merge failed for {source} -> {target}"))?;

        println!(
            "{} {source} into {target}",
            "Merged".green().bold()
        );
        for path in &outcome.resolved {
            println!("\tresolved: {path}");
        }
        if let Some(url) = &outcome.url {
            println!("Url:\t{url}");
        }

        if let Some(root) = &self.kitchens_root {
            let local = root.join(&target.0);
            if local.is_dir() {
                let warnings = merge.refresh_local_kitchen(&local, &target, &ctx.ignore)?;
                for warning in warnings {
                    println!("{} {warning}", "warning:".yellow().bold());
                }
                println!("Refreshed local kitchen at {}", local.display());
            }
        }
        Ok(())
    }
}

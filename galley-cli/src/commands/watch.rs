//! `galley watch-servings`: follow a kitchen's active servings until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use galley_core::KitchenName;
use galley_watch::{run_blocking, ActiveServingWatcher, ServingChange, ServingEvent, WatchConfig};

use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct WatchServingsArgs {
    /// Kitchen to watch.
    #[arg(short, long)]
    pub kitchen: String,

    /// Seconds between polls; defaults to `watch_interval_secs` from the config.
    #[arg(long)]
    pub period: Option<u64>,

    /// Print one JSON object per event.
    #[arg(long)]
    pub json: bool,
}

impl WatchServingsArgs {
    pub fn run(self) -> Result<()> {
        let ctx = AppContext::load()?;
        let period = self.period.unwrap_or(ctx.config.watch_interval_secs);
        let config = WatchConfig::new(
            KitchenName::from(self.kitchen.as_str()),
            Duration::from_secs(period),
        )?;
        let remote = Arc::new(ctx.remote()?);
        let watcher = ActiveServingWatcher::new(config, remote);

        println!(
            "Watching servings of {} every {period}s (ctrl-c to stop)",
            self.kitchen.bold()
        );
        let json = self.json;
        run_blocking(watcher, |event| {
            if json {
                match serde_json::to_string(event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => tracing::warn!(error = %err, "could not serialize event"),
                }
            } else {
                println!("{}", describe(event));
            }
        })
        .context("watch-servings stopped")
    }
}

fn describe(event: &ServingEvent) -> String {
    let serving = &event.serving;
    let label = match &event.change {
        ServingChange::Started => "STARTED".green().bold().to_string(),
        ServingChange::StatusChanged { previous } => {
            format!("{} {previous} ->", "CHANGED".yellow().bold())
        }
        ServingChange::Finished => "FINISHED".bright_black().bold().to_string(),
    };
    format!(
        "{label} {} {}/{} {}",
        serving.serving_id, serving.recipe, serving.variation, serving.status
    )
}

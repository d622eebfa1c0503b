//! Galley: recipe and kitchen synchronization CLI.
//!
//! # Usage
//!
//! ```text
//! galley recipe-status  -k <kitchen> -r <recipe> [--kitchen-dir <dir>]
//! galley recipe-get     -k <kitchen> -r <recipe> [--overwrite] [--delete-local] [--yes]
//! galley recipe-update  -k <kitchen> -r <recipe> [-m <message>] [--delete-remote]
//! galley file-diff      -k <kitchen> -r <recipe> <file_path>
//! galley file-merge     --source-kitchen <s> --target-kitchen <t> <file_path>
//! galley file-resolve   --source-kitchen <s> --target-kitchen <t> <file_path>
//! galley kitchen-merge-preview --source-kitchen <s> --target-kitchen <t> [--clean]
//! galley kitchen-merge  --source-kitchen <s> --target-kitchen <t> [--kitchens-root <dir>]
//! galley watch-servings -k <kitchen> [--period <secs>] [--json]
//! ```
//!
//! Exit codes: 0 success, 2 invalid input, 3 remote has changes, 4 unresolved
//! conflicts, 5 remote failure, 6 local I/O failure, 1 anything else.

mod commands;
mod context;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{
    file::{FileDiffArgs, FileMergeArgs, FileResolveArgs},
    kitchen::{KitchenMergeArgs, KitchenMergePreviewArgs},
    recipe::{RecipeGetArgs, RecipeStatusArgs, RecipeUpdateArgs},
    watch::WatchServingsArgs,
};
use galley_core::{ConfigError, PathError};
use galley_sync::{ErrorKind, RemoteError, SyncError};
use galley_tools::ToolError;
use galley_watch::WatchError;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "galley",
    version,
    about = "Synchronize recipes between a local kitchen directory and the remote store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare a local recipe against the remote.
    RecipeStatus(RecipeStatusArgs),

    /// Fetch a recipe, merging remote changes into local edits.
    RecipeGet(RecipeGetArgs),

    /// Push local changes of a recipe to the remote.
    RecipeUpdate(RecipeUpdateArgs),

    /// Open the diff tool on a local file and its remote copy.
    FileDiff(FileDiffArgs),

    /// Open the merge tool on a file staged by kitchen-merge-preview.
    FileMerge(FileMergeArgs),

    /// Mark a staged conflict as resolved.
    FileResolve(FileResolveArgs),

    /// Preview merging one kitchen into another and stage conflicts.
    KitchenMergePreview(KitchenMergePreviewArgs),

    /// Merge one kitchen into another once every conflict is resolved.
    KitchenMerge(KitchenMergeArgs),

    /// Poll a kitchen's running servings and print changes.
    WatchServings(WatchServingsArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::RecipeStatus(args) => args.run(),
        Commands::RecipeGet(args) => args.run(),
        Commands::RecipeUpdate(args) => args.run(),
        Commands::FileDiff(args) => args.run(),
        Commands::FileMerge(args) => args.run(),
        Commands::FileResolve(args) => args.run(),
        Commands::KitchenMergePreview(args) => args.run(),
        Commands::KitchenMerge(args) => args.run(),
        Commands::WatchServings(args) => args.run(),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("GALLEY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn kind_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Validation => 2,
        ErrorKind::RemoteChanged => 3,
        ErrorKind::Conflict => 4,
        ErrorKind::Remote => 5,
        ErrorKind::Io => 6,
    }
}

/// Exit code of the first typed error in the chain.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<SyncError>() {
            return kind_code(e.kind());
        }
        if let Some(e) = cause.downcast_ref::<RemoteError>() {
            return match e {
                RemoteError::InvalidHandle { .. } => kind_code(ErrorKind::Validation),
                _ => kind_code(ErrorKind::Remote),
            };
        }
        if let Some(e) = cause.downcast_ref::<ToolError>() {
            return match e {
                ToolError::Launch { .. } => kind_code(ErrorKind::Io),
                _ => kind_code(ErrorKind::Validation),
            };
        }
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return match e {
                ConfigError::Io { .. } => kind_code(ErrorKind::Io),
                _ => kind_code(ErrorKind::Validation),
            };
        }
        if cause.downcast_ref::<PathError>().is_some() {
            return kind_code(ErrorKind::Validation);
        }
        if let Some(e) = cause.downcast_ref::<WatchError>() {
            return match e {
                WatchError::InvalidConfig(_) => kind_code(ErrorKind::Validation),
                WatchError::Remote { .. } => kind_code(ErrorKind::Remote),
                WatchError::Runtime(_) | WatchError::Join { .. } => 1,
            };
        }
    }
    1
}

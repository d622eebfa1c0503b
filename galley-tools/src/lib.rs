//! # galley-tools
//!
//! Tera-rendered command templates for the external merge and diff tools.
//!
//! ```rust,no_run
//! use galley_tools::{MergeToolPaths, ToolLauncher};
//!
//! fn open_merge(paths: &MergeToolPaths) {
//!     if let Ok(launcher) = ToolLauncher::new("meld {{left}} {{merge}} {{right}}", "diff {{local}} {{remote}}") {
//!         let _ = launcher.run_merge(paths);
//!     }
//! }
//! ```

pub mod context;
pub mod error;
pub mod launcher;

pub use context::{DiffToolPaths, MergeToolPaths};
pub use error::ToolError;
pub use launcher::{ToolLauncher, ToolRun};

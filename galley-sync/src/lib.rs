//! # galley-sync
//!
//! Recipe and kitchen synchronization against a remote recipe store.
//!
//! - [`recipe::RecipeSyncOrchestrator`] drives `get`, `update`, `status` and
//!   `file_diff` for one recipe directory.
//! - [`kitchen::KitchenMergeOrchestrator`] stages cross-kitchen merges on disk
//!   and commits them once every conflict is resolved.
//!
//! Both talk to the remote through the [`remote::RecipeRemote`] trait and keep
//! per-file content ids in a [`state::LocalStateTracker`].

pub mod classify;
pub mod error;
pub mod kitchen;
pub mod merge;
pub mod paths;
pub mod recipe;
pub mod remote;
pub mod state;
pub mod status;
pub(crate) mod writer;

pub use classify::StatusReport;
pub use error::{ErrorKind, SyncError};
pub use kitchen::{CommitOutcome, KitchenMergeOrchestrator, PreviewOutcome};
pub use merge::{FileMergeCoordinator, MergeResult};
pub use recipe::{Confirm, GetOptions, GetOutcome, RecipeSyncOrchestrator, UpdateOutcome};
pub use remote::{RecipeRemote, RemoteError};
pub use state::{content_id_of, LocalStateTracker};
pub use status::{LocalStatusComputer, RemoteManifest};

//! Active-serving watcher: polls a kitchen's running servings and reports
//! when they start, change status or finish.

mod error;
mod watcher;

pub use error::WatchError;
pub use watcher::{
    diff_servings, run_blocking, ActiveServingWatcher, ServingChange, ServingEvent, SharedRemote,
    WatchConfig, WatchHandle,
};

use thiserror::Error;

use galley_sync::RemoteError;

/// Error surface for the serving watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("invalid watch settings: {0}")]
    InvalidConfig(String),

    #[error("polling active servings failed {failures} times in a row: {source}")]
    Remote {
        failures: u32,
        #[source]
        source: RemoteError,
    },

    #[error("could not start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },
}

//! Error types for galley-tools.

use thiserror::Error;

/// Errors from rendering or launching an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tera template engine error (bad template or missing variable).
    #[error("tool template error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error while building the template context.
    #[error("tool context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A staged path cannot be passed through the shell as one word.
    #[error("cannot pass '{path}' to the shell: it contains a nul byte")]
    UnquotablePath { path: String },

    /// The rendered command rendered to nothing.
    #[error("{tool} tool template rendered an empty command")]
    EmptyCommand { tool: &'static str },

    /// The shell could not be spawned.
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

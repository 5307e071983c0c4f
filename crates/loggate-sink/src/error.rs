//! Error types for sink operations.

use thiserror::Error;

/// Errors raised while persisting log entries.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open or create {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize log entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

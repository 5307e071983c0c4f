//! Error types for the server crate.

use loggate_admission::AdmissionError;
use loggate_sink::SinkError;
use thiserror::Error;

/// Errors raised while setting up or running the server. Per-connection
/// failures never surface here: they are handled inside the pipeline and
/// isolated to their own connection.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind TCP listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid incoming message schema: {0}")]
    Schema(String),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

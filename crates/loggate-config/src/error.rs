//! Error types for configuration loading.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("config file failed schema validation:\n{violations}")]
    SchemaViolations { violations: String },

    #[error("the embedded config schema is invalid: {0}")]
    EmbeddedSchema(String),

    #[error("\"properties\" object not found in the incoming message schema")]
    MissingProperties,

    #[error("\"properties\" in the incoming message schema cannot be empty; at minimum \"source_id\" is required")]
    EmptyProperties,

    #[error("column_order contains column not found in the incoming message schema: {column}")]
    UnknownColumn { column: String },

    #[error("{field} must be greater than zero")]
    ZeroLimit { field: &'static str },
}

//! Config file loading.
//!
//! The config file is validated against the embedded schema before
//! deserialization so a hand-edited file fails with the full list of
//! violations instead of the first serde error.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use jsonschema::Validator;
use serde_json::Value;

use crate::error::ConfigError;
use crate::settings::Config;

/// JSON Schema the config file itself must satisfy. Embedded in the binary
/// so an operator cannot loosen it by editing a file on disk.
const CONFIG_SCHEMA: &str = include_str!("config_schema.json");

/// Columns the formatter injects itself; always legal in `column_order`.
const INJECTED_COLUMNS: [&str; 2] = ["timestamp", "source_ip"];

impl Config {
    /// Load, schema-check, and deserialize the config file at `path`, then
    /// load the incoming-message schema it references. Relative schema paths
    /// resolve against the config file's directory.
    ///
    /// # Errors
    /// Returns an error if either file is unreadable, fails validation, or
    /// references columns the message schema does not define.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let document: Value =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        validate_against_embedded_schema(&document)?;

        let mut config: Self =
            serde_json::from_value(document).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        if config.protocol.messages_per_ip_per_minute == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "messages_per_ip_per_minute",
            });
        }
        if config.protocol.source_messages_per_minute() == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "messages_per_source_per_minute",
            });
        }
        if config.protocol.bad_message_blacklist_threshold == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "bad_message_blacklist_threshold",
            });
        }

        let schema_path = resolve_sibling(path, &config.protocol.incoming_json_schema);
        config.protocol.incoming_message_schema =
            load_incoming_schema(&schema_path, &config.logfile.column_order)?;

        Ok(config)
    }
}

fn validate_against_embedded_schema(document: &Value) -> Result<(), ConfigError> {
    let schema: Value = serde_json::from_str(CONFIG_SCHEMA)
        .map_err(|e| ConfigError::EmbeddedSchema(e.to_string()))?;
    let validator =
        Validator::new(&schema).map_err(|e| ConfigError::EmbeddedSchema(e.to_string()))?;

    let mut violations = String::new();
    for error in validator.iter_errors(document) {
        let _ = writeln!(violations, "- {error}");
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::SchemaViolations { violations })
    }
}

/// Resolve `reference` relative to the directory containing `config_path`.
fn resolve_sibling(config_path: &Path, reference: &str) -> std::path::PathBuf {
    let reference = Path::new(reference);
    if reference.is_absolute() {
        reference.to_path_buf()
    } else {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(reference)
    }
}

/// Read the incoming-message schema and sanity-check it: `properties` must
/// exist and be non-empty, and every configured column must either appear in
/// `properties` or be one of the injected columns.
fn load_incoming_schema(path: &Path, column_order: &[String]) -> Result<String, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let schema: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Err(ConfigError::MissingProperties);
    };
    if properties.is_empty() {
        return Err(ConfigError::EmptyProperties);
    }

    for column in column_order {
        if !properties.contains_key(column) && !INJECTED_COLUMNS.contains(&column.as_str()) {
            return Err(ConfigError::UnknownColumn {
                column: column.clone(),
            });
        }
    }

    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{InvalidMessagePolicy, LogFormat, TimestampFormat};
    use std::io::Write;

    const MESSAGE_SCHEMA: &str = r#"{
        "type": "object",
        "properties": {
            "source_id": { "type": "string" },
            "level": { "type": "string" },
            "message": { "type": "string" }
        },
        "required": ["level", "message"]
    }"#;

    fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
        let schema_path = dir.join("incoming_message_schema.json");
        fs::write(&schema_path, MESSAGE_SCHEMA).unwrap();
        let config_path = dir.join("config.json");
        let mut f = fs::File::create(&config_path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        config_path
    }

    fn base_config(column_order: &str, format: &str) -> String {
        format!(
            r#"{{
                "server_settings": {{ "ip": "127.0.0.1", "port": 8080 }},
                "logfile_settings": {{
                    "path": "logs/events.log",
                    "format": "{format}",
                    "column_order": {column_order},
                    "timestamp_format": "RFC3339"
                }},
                "protocol_settings": {{
                    "incoming_json_schema": "incoming_message_schema.json",
                    "messages_per_ip_per_minute": 20,
                    "bad_message_blacklist_threshold": 5,
                    "blacklisted_ips": ["10.0.0.66"],
                    "blacklist_permanent": false,
                    "blacklist_duration_seconds": 600
                }},
                "error_handling": {{
                    "invalid_message": "redirect_to_error_log",
                    "error_log_path": "logs/errors.log"
                }}
            }}"#
        )
    }

    #[test]
    fn loads_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            &base_config(r#"["timestamp", "source_ip", "level", "message"]"#, "json"),
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.address(), "127.0.0.1:8080");
        assert_eq!(config.logfile.format, LogFormat::Json);
        assert_eq!(config.logfile.timestamp_format, TimestampFormat::Rfc3339);
        assert_eq!(config.protocol.messages_per_ip_per_minute, 20);
        // Source limit falls back to the IP limit when omitted.
        assert_eq!(config.protocol.source_messages_per_minute(), 20);
        assert_eq!(
            config.error_handling.invalid_message,
            InvalidMessagePolicy::RedirectToErrorLog
        );
        assert!(config.protocol.incoming_message_schema.contains("source_id"));
    }

    #[test]
    fn rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), &base_config(r#"["message"]"#, "xml"));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaViolations { .. }));
    }

    #[test]
    fn rejects_unknown_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            &base_config(r#"["message", "no_such_column"]"#, "json"),
        );

        let err = Config::load(&path).unwrap_err();
        match err {
            ConfigError::UnknownColumn { column } => assert_eq!(column, "no_such_column"),
            other => panic!("expected UnknownColumn, got {other}"),
        }
    }

    #[test]
    fn injected_columns_are_always_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            &base_config(r#"["timestamp", "source_ip"]"#, "plaintext"),
        );

        assert!(Config::load(&path).is_ok());
    }

    #[test]
    fn rejects_schema_without_properties() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), &base_config(r#"["message"]"#, "json"));
        fs::write(
            dir.path().join("incoming_message_schema.json"),
            r#"{ "type": "object" }"#,
        )
        .unwrap();

        let err = Config::load(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingProperties));
    }

    #[test]
    fn rejects_schema_with_empty_properties() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), &base_config(r#"["message"]"#, "json"));
        fs::write(
            dir.path().join("incoming_message_schema.json"),
            r#"{ "type": "object", "properties": {} }"#,
        )
        .unwrap();

        let err = Config::load(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyProperties));
    }

    #[test]
    fn rejects_missing_section() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), r#"{ "server_settings": { "ip": "0.0.0.0", "port": 1 } }"#);

        let err = Config::load(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaViolations { .. }));
    }
}

//! Schema validation of incoming payloads.
//!
//! The message schema is compiled once at startup and shared immutably by
//! every connection. A payload that is not JSON at all is reported as a
//! validation failure, not an internal error: the client sent it.

use jsonschema::Validator;
use serde_json::Value;

use crate::error::ServerError;

/// Compiled JSON Schema for incoming messages.
pub struct SchemaValidator {
    validator: Validator,
}

impl SchemaValidator {
    /// Compile the operator-supplied message schema.
    ///
    /// # Errors
    /// Returns an error if the schema is not valid JSON or not a valid
    /// JSON Schema.
    pub fn new(schema_json: &str) -> Result<Self, ServerError> {
        let schema: Value =
            serde_json::from_str(schema_json).map_err(|e| ServerError::Schema(e.to_string()))?;
        let validator =
            Validator::new(&schema).map_err(|e| ServerError::Schema(e.to_string()))?;
        Ok(Self { validator })
    }

    /// Validate a raw payload, returning every violation on failure.
    ///
    /// # Errors
    /// Returns the list of violation strings; non-JSON payloads yield a
    /// single synthetic violation.
    pub fn validate(&self, payload: &[u8]) -> Result<(), Vec<String>> {
        let document: Value = match serde_json::from_slice(payload) {
            Ok(document) => document,
            Err(e) => return Err(vec![format!("message is not valid JSON: {e}")]),
        };

        let violations: Vec<String> = self
            .validator
            .iter_errors(&document)
            .map(|e| e.to_string())
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
        "type": "object",
        "properties": {
            "source_id": { "type": "string" },
            "message": { "type": "string" }
        },
        "required": ["message"]
    }"#;

    #[test]
    fn accepts_conforming_payload() {
        let v = SchemaValidator::new(SCHEMA).unwrap();
        assert!(v.validate(br#"{"source_id":"dev-1","message":"ok"}"#).is_ok());
    }

    #[test]
    fn reports_all_violations() {
        let v = SchemaValidator::new(SCHEMA).unwrap();
        let violations = v.validate(br#"{"source_id": 42}"#).unwrap_err();
        assert!(violations.len() >= 2, "type and required violations: {violations:?}");
    }

    #[test]
    fn non_json_payload_is_a_violation() {
        let v = SchemaValidator::new(SCHEMA).unwrap();
        let violations = v.validate(b"not json at all").unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("not valid JSON"));
    }

    #[test]
    fn rejects_invalid_schema() {
        assert!(SchemaValidator::new("{ not json").is_err());
    }
}

//! Per-connection request pipeline.
//!
//! Stage order is a hard invariant: IP blacklist (before any bytes are
//! read), bounded read, schema validation, source blacklist, rate limits
//! (source then IP), format, persist, respond. Banning is sticky: a banned
//! identity never reaches a later stage. Every path writes at most one
//! response and the connection is always closed afterwards.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use loggate_admission::{unix_now_secs, AbuseTracker, Namespace};
use loggate_config::{Config, InvalidMessagePolicy};
use loggate_sink::{EntryFormatter, EventSink, FileSink};

use crate::error::ServerError;
use crate::validate::SchemaValidator;

/// Maximum request payload size in bytes; a single bounded read.
pub const MAX_REQUEST_BYTES: usize = 4096;

/// Generic reply for failures whose detail must not leak to clients.
const INTERNAL_ERROR: &str = "internal server error";

/// How one message left the pipeline.
enum Outcome {
    /// Persisted; tell the client it was received.
    Accepted,
    /// Client-caused rejection; the message goes back verbatim.
    Rejected(String),
    /// Internal failure; log the detail, answer generically.
    Internal {
        detail: String,
        category: &'static str,
    },
}

/// Shared per-process state driving every connection.
pub struct ClientHandler {
    validator: SchemaValidator,
    formatter: EntryFormatter,
    sink: Arc<dyn EventSink>,
    /// Single synchronization domain for all abuse state: every
    /// check-then-update sequence for a message runs under one acquisition.
    tracker: Mutex<AbuseTracker>,
    invalid_message_policy: InvalidMessagePolicy,
}

impl ClientHandler {
    /// Build a handler with a file-backed sink, verifying both log paths
    /// are writable before any traffic is served.
    ///
    /// # Errors
    /// Returns an error for an invalid message schema, zero-valued limits,
    /// or unwritable log paths.
    pub fn new(config: &Config) -> Result<Self, ServerError> {
        let sink = FileSink::new(
            config.logfile.path.clone(),
            config.error_handling.error_log_path.clone(),
        );
        sink.verify_paths()?;
        Self::with_sink(config, Arc::new(sink))
    }

    /// Build a handler writing through the given sink.
    ///
    /// # Errors
    /// Returns an error for an invalid message schema or zero-valued limits.
    pub fn with_sink(config: &Config, sink: Arc<dyn EventSink>) -> Result<Self, ServerError> {
        Ok(Self {
            validator: SchemaValidator::new(&config.protocol.incoming_message_schema)?,
            formatter: EntryFormatter::new(&config.logfile),
            sink,
            tracker: Mutex::new(AbuseTracker::new(&config.protocol, unix_now_secs())?),
            invalid_message_policy: config.error_handling.invalid_message,
        })
    }

    /// Consume one connection end to end. Failures are isolated here; this
    /// never propagates an error to the caller.
    pub async fn handle(&self, mut stream: TcpStream, peer: SocketAddr) {
        let client_ip = peer.ip().to_string();

        // Banned IPs are refused before any bytes are read.
        let verdict = self
            .tracker
            .lock()
            .check_blacklist(Namespace::Ip, &client_ip, unix_now_secs());
        if let Err(err) = verdict {
            tracing::debug!(client_ip = %client_ip, error = %err, "connection refused at blacklist");
            self.respond(&mut stream, false, &err.to_string()).await;
            return;
        }

        let mut buffer = vec![0u8; MAX_REQUEST_BYTES];
        let read = match stream.read(&mut buffer).await {
            Ok(read) => read,
            Err(e) => {
                self.report_internal(&e.to_string(), "client:read");
                self.respond(&mut stream, false, INTERNAL_ERROR).await;
                return;
            }
        };
        if read == 0 {
            self.report_internal("connection closed before any payload", "client:read");
            self.respond(&mut stream, false, INTERNAL_ERROR).await;
            return;
        }

        match self.admit_and_persist(&buffer[..read], &client_ip) {
            Outcome::Accepted => self.respond(&mut stream, true, "log received").await,
            Outcome::Rejected(message) => {
                tracing::debug!(client_ip = %client_ip, message = %message, "message rejected");
                self.respond(&mut stream, false, &message).await;
            }
            Outcome::Internal { detail, category } => {
                self.report_internal(&detail, category);
                self.respond(&mut stream, false, INTERNAL_ERROR).await;
            }
        }
    }

    /// Validation, admission bookkeeping, formatting, and persistence for
    /// one payload.
    fn admit_and_persist(&self, payload: &[u8], client_ip: &str) -> Outcome {
        if let Err(violations) = self.validator.validate(payload) {
            return self.handle_invalid_message(payload, &violations);
        }

        // The payload passed schema validation, so a decode failure here is
        // ours, not the client's.
        let fields = match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => {
                return Outcome::Internal {
                    detail: "validated payload is not a JSON object".to_string(),
                    category: "pipeline:parse",
                }
            }
            Err(e) => {
                return Outcome::Internal {
                    detail: e.to_string(),
                    category: "pipeline:parse",
                }
            }
        };

        // A missing or non-string source id is tracked as the empty-string
        // identity rather than escaping source-level limits.
        let source_id = fields
            .get("source_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let now = unix_now_secs();
        {
            let mut tracker = self.tracker.lock();
            if let Err(err) = tracker.check_blacklist(Namespace::Source, &source_id, now) {
                return Outcome::Rejected(err.to_string());
            }
            tracker.register(client_ip, &source_id);
            // This message passed schema validation, so any bad-format
            // streak the source had is broken.
            tracker.clear_bad_format(&source_id);
            if let Err(err) = tracker.check_rate(Namespace::Source, &source_id, now) {
                return Outcome::Rejected(err.to_string());
            }
            if let Err(err) = tracker.check_rate(Namespace::Ip, client_ip, now) {
                return Outcome::Rejected(err.to_string());
            }
        }

        let entry = match self.formatter.format(&fields, client_ip, Utc::now()) {
            Ok(entry) => entry,
            Err(e) => {
                return Outcome::Internal {
                    detail: e.to_string(),
                    category: "pipeline:format",
                }
            }
        };

        // Best-effort single attempt; a failed write is not retried.
        if let Err(e) = self.sink.append(&entry) {
            return Outcome::Internal {
                detail: e.to_string(),
                category: "sink:append",
            };
        }

        Outcome::Accepted
    }

    /// Schema-validation failure: count the offense against the source id
    /// (extracted best-effort, since the payload may be arbitrary bytes) and
    /// report either the resulting ban or the violations themselves.
    fn handle_invalid_message(&self, payload: &[u8], violations: &[String]) -> Outcome {
        let source_id = extract_source_id(payload);

        if let Err(ban) = self
            .tracker
            .lock()
            .record_bad_format(&source_id, unix_now_secs())
        {
            return Outcome::Rejected(ban.to_string());
        }

        let text = violations_text(violations);
        if self.invalid_message_policy == InvalidMessagePolicy::RedirectToErrorLog {
            if let Err(e) = self.sink.append_error(&text, "invalid message format") {
                tracing::warn!(error = %e, "failed to mirror validation failure to error log");
            }
        }
        Outcome::Rejected(text)
    }

    fn report_internal(&self, detail: &str, category: &str) {
        tracing::warn!(category, detail, "internal pipeline failure");
        if let Err(e) = self.sink.append_error(detail, category) {
            tracing::error!(error = %e, "failed to write to error log");
        }
    }

    /// Write the single JSON response and close the connection. A failed
    /// response write is recorded but cannot be reported to anyone else.
    async fn respond(&self, stream: &mut TcpStream, success: bool, message: &str) {
        let body = serde_json::json!({ "success": success, "message": message }).to_string();
        if let Err(e) = stream.write_all(body.as_bytes()).await {
            self.report_internal(
                &format!("unable to respond to client: {e}"),
                "client:respond",
            );
            return;
        }
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(error = %e, "connection close failed");
        }
    }
}

/// Best-effort `source_id` extraction from a payload that failed schema
/// validation. Unparseable payloads fall back to the empty-string identity.
fn extract_source_id(payload: &[u8]) -> String {
    serde_json::from_slice::<Value>(payload)
        .ok()
        .as_ref()
        .and_then(|doc| doc.get("source_id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn violations_text(violations: &[String]) -> String {
    let mut text = String::from("message failed to validate against schema:\n");
    for violation in violations {
        text.push_str("- ");
        text.push_str(violation);
        text.push('\n');
    }
    text
}

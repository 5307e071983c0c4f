//! Configuration sections mirroring the on-disk config file.

use serde::Deserialize;

/// Top-level configuration, one section per concern.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "server_settings")]
    pub server: ServerSettings,

    #[serde(rename = "logfile_settings")]
    pub logfile: LogfileSettings,

    #[serde(rename = "protocol_settings")]
    pub protocol: ProtocolSettings,

    #[serde(rename = "error_handling")]
    pub error_handling: ErrorSettings,
}

/// Listener bind address.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub ip: String,
    pub port: u16,
}

impl ServerSettings {
    /// The `ip:port` string the listener binds to.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// On-disk representation of persisted log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Plaintext,
}

/// How to render the injected `timestamp` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TimestampFormat {
    #[serde(rename = "RFC3339")]
    Rfc3339,
    #[serde(rename = "RFC2822")]
    Rfc2822,
    #[serde(rename = "UnixSeconds")]
    UnixSeconds,
}

/// Event log destination and entry layout.
#[derive(Debug, Clone, Deserialize)]
pub struct LogfileSettings {
    pub path: String,
    pub format: LogFormat,
    #[serde(default = "default_field_delimiter")]
    pub plaintext_field_delimiter: String,
    #[serde(default = "default_entry_delimiter")]
    pub plaintext_entry_delimiter: String,
    pub column_order: Vec<String>,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: TimestampFormat,
}

fn default_field_delimiter() -> String {
    "|".into()
}

fn default_entry_delimiter() -> String {
    "\n".into()
}

const fn default_timestamp_format() -> TimestampFormat {
    TimestampFormat::Rfc3339
}

/// Wire protocol and abuse-prevention thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolSettings {
    /// Path to the JSON Schema incoming messages must satisfy.
    pub incoming_json_schema: String,

    /// Accepted messages per rolling minute, per client IP.
    pub messages_per_ip_per_minute: u32,

    /// Accepted messages per rolling minute, per source id.
    /// Falls back to the IP limit when omitted.
    #[serde(default)]
    pub messages_per_source_per_minute: Option<u32>,

    /// Consecutive offenses (rate or format) that trigger a ban.
    pub bad_message_blacklist_threshold: u32,

    /// IPs banned from startup.
    #[serde(default)]
    pub blacklisted_ips: Vec<String>,

    /// Source ids banned from startup.
    #[serde(default)]
    pub blacklisted_sources: Vec<String>,

    /// When true, bans never expire.
    pub blacklist_permanent: bool,

    /// Ban length in seconds when bans are not permanent.
    pub blacklist_duration_seconds: u32,

    /// Raw bytes of the incoming message schema, filled in by the loader.
    #[serde(skip)]
    pub incoming_message_schema: String,
}

impl ProtocolSettings {
    /// Per-minute limit for the source-id namespace.
    #[must_use]
    pub fn source_messages_per_minute(&self) -> u32 {
        self.messages_per_source_per_minute
            .unwrap_or(self.messages_per_ip_per_minute)
    }
}

/// What to do with client-caused validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidMessagePolicy {
    /// Report the violations to the client only.
    RespondOnly,
    /// Report to the client and mirror the violations to the error log.
    RedirectToErrorLog,
}

/// Error reporting policy and error log destination.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorSettings {
    pub invalid_message: InvalidMessagePolicy,
    pub error_log_path: String,
}

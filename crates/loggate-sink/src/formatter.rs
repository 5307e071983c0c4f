//! Log entry formatting.
//!
//! The persisted layout is driven entirely by `column_order`: only listed
//! columns are written, in order, and the synthetic `timestamp` and
//! `source_ip` columns are injected only when the order names them.

use chrono::{DateTime, Utc};
use loggate_config::{LogFormat, LogfileSettings, TimestampFormat};
use serde_json::{Map, Value};

use crate::error::SinkError;

/// Formats accepted messages into their on-disk representation.
#[derive(Debug, Clone)]
pub struct EntryFormatter {
    format: LogFormat,
    field_delimiter: String,
    entry_delimiter: String,
    column_order: Vec<String>,
    timestamp_format: TimestampFormat,
}

impl EntryFormatter {
    #[must_use]
    pub fn new(settings: &LogfileSettings) -> Self {
        Self {
            format: settings.format,
            field_delimiter: settings.plaintext_field_delimiter.clone(),
            entry_delimiter: settings.plaintext_entry_delimiter.clone(),
            column_order: settings.column_order.clone(),
            timestamp_format: settings.timestamp_format,
        }
    }

    /// Render one accepted message.
    ///
    /// # Errors
    /// Returns an error if JSON serialization of the filtered entry fails.
    pub fn format(
        &self,
        fields: &Map<String, Value>,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<String, SinkError> {
        let mut entry = fields.clone();
        if self.column_order.iter().any(|c| c == "timestamp") {
            entry.insert(
                "timestamp".to_string(),
                Value::String(self.render_timestamp(now)),
            );
        }
        if self.column_order.iter().any(|c| c == "source_ip") {
            entry.insert("source_ip".to_string(), Value::String(client_ip.to_string()));
        }

        match self.format {
            LogFormat::Json => self.format_json(&entry),
            LogFormat::Plaintext => Ok(self.format_plaintext(&entry)),
        }
    }

    fn render_timestamp(&self, now: DateTime<Utc>) -> String {
        match self.timestamp_format {
            TimestampFormat::Rfc3339 => now.to_rfc3339(),
            TimestampFormat::Rfc2822 => now.to_rfc2822(),
            TimestampFormat::UnixSeconds => now.timestamp().to_string(),
        }
    }

    /// JSON entries keep only the ordered columns. Entries are separated by
    /// ",\n" so the file body reads as the inside of a JSON array.
    fn format_json(&self, entry: &Map<String, Value>) -> Result<String, SinkError> {
        let mut filtered = Map::new();
        for column in &self.column_order {
            if let Some(value) = entry.get(column) {
                filtered.insert(column.clone(), value.clone());
            }
        }
        let rendered = serde_json::to_string(&Value::Object(filtered))?;
        Ok(format!("{rendered},\n"))
    }

    /// Plaintext entries join column values with the field delimiter.
    /// Columns absent from the message render as empty fields.
    fn format_plaintext(&self, entry: &Map<String, Value>) -> String {
        let mut line = String::new();
        for column in &self.column_order {
            match entry.get(column) {
                Some(Value::String(s)) => line.push_str(s),
                Some(other) => line.push_str(&other.to_string()),
                None => {}
            }
            line.push_str(&self.field_delimiter);
        }
        line.push_str(&self.entry_delimiter);
        line
    }
}

//! Append-only file writers for the event log and the error log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::SinkError;

/// Destination for formatted entries and internal error reports.
///
/// The trait seam lets pipeline tests substitute a failing or recording
/// sink without touching the filesystem.
pub trait EventSink: Send + Sync {
    /// Append one formatted entry to the event log.
    ///
    /// # Errors
    /// Returns an error when the write fails; the caller must not retry.
    fn append(&self, entry: &str) -> Result<(), SinkError>;

    /// Append one categorized message to the error log.
    ///
    /// # Errors
    /// Returns an error when the write fails.
    fn append_error(&self, message: &str, category: &str) -> Result<(), SinkError>;
}

/// File-backed sink. The event log and the error log are independent
/// resources, so each append path holds its own lock.
#[derive(Debug)]
pub struct FileSink {
    log_path: String,
    error_log_path: String,
    log_lock: Mutex<()>,
    error_lock: Mutex<()>,
}

impl FileSink {
    #[must_use]
    pub const fn new(log_path: String, error_log_path: String) -> Self {
        Self {
            log_path,
            error_log_path,
            log_lock: Mutex::new(()),
            error_lock: Mutex::new(()),
        }
    }

    /// Startup probe: both files must be creatable/appendable before the
    /// listener starts accepting traffic.
    ///
    /// # Errors
    /// Returns the first path that cannot be opened for append.
    pub fn verify_paths(&self) -> Result<(), SinkError> {
        for path in [&self.log_path, &self.error_log_path] {
            open_append(path)?;
        }
        Ok(())
    }
}

impl EventSink for FileSink {
    fn append(&self, entry: &str) -> Result<(), SinkError> {
        let _guard = self.log_lock.lock();
        let mut file = open_append(&self.log_path)?;
        file.write_all(entry.as_bytes())
            .map_err(|source| SinkError::Write {
                path: self.log_path.clone(),
                source,
            })
    }

    fn append_error(&self, message: &str, category: &str) -> Result<(), SinkError> {
        let _guard = self.error_lock.lock();
        let mut file = open_append(&self.error_log_path)?;
        let line = format!("ERROR: {category}: {}: {message}\n", Utc::now().to_rfc3339());
        file.write_all(line.as_bytes())
            .map_err(|source| SinkError::Write {
                path: self.error_log_path.clone(),
                source,
            })
    }
}

fn open_append(path: &str) -> Result<std::fs::File, SinkError> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(Path::new(path))
        .map_err(|source| SinkError::Open {
            path: path.to_string(),
            source,
        })
}

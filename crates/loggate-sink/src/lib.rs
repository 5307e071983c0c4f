//! Loggate Sink - Persisted log formatting and append-only file writers
//!
//! Turns an accepted message's fields into their on-disk representation
//! (JSON or delimited plaintext, with policy-driven `timestamp`/`source_ip`
//! injection) and appends entries to the event log and the error log. The
//! two files are unrelated resources, so each append path is serialized by
//! its own lock.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod formatter;
mod writer;

pub use error::*;
pub use formatter::*;
pub use writer::*;

//! Loggate Config - Configuration loading and validation
//!
//! Loads the gateway's JSON configuration file, validates it against an
//! embedded JSON Schema before deserializing, and loads the operator-supplied
//! schema for incoming log messages. Both files are read once at startup and
//! are immutable for the process lifetime.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod loader;
mod settings;

pub use error::*;
pub use loader::*;
pub use settings::*;

//! Loggate Server - TCP ingestion front end
//!
//! Accepts persistent-per-request TCP connections, drives each one through
//! the admission pipeline (blacklist, schema validation, rate limiting),
//! persists accepted entries through the sink, and answers every request
//! with exactly one JSON response before closing the connection.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod pipeline;
mod server;
mod validate;

pub use error::*;
pub use pipeline::*;
pub use server::*;
pub use validate::*;

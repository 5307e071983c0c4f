//! Loggate Admission - Abuse prevention for the log ingestion gateway
//!
//! This crate decides whether a message from an untrusted client is admitted:
//!
//! - **Sliding window**: per-identity ring buffer of accept timestamps
//!   enforcing a rolling per-minute quota
//! - **Blacklisting**: time-bounded or permanent bans promoted from repeated
//!   rate or format offenses, plus operator-seeded bans
//! - **Decision API**: blacklist check, rate check, and bad-format
//!   bookkeeping, consumed by the connection pipeline
//!
//! The [`AbuseTracker`] takes `&mut self` and explicit timestamps; the server
//! wraps one instance in a mutex so every check-then-update sequence for a
//! message runs under a single synchronization domain.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod sliding_window;
mod tracker;

pub use error::*;
pub use sliding_window::*;
pub use tracker::*;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in whole seconds, clamped below [`NEVER`] so a real
/// timestamp can never collide with the "never seen" sentinel. The `u32`
/// range keeps this valid until the year 2106.
#[must_use]
pub fn unix_now_secs() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    u32::try_from(secs).unwrap_or(NEVER - 1)
}

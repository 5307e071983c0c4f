//! Admission rejection reasons.
//!
//! Every variant is client-caused and its message is sent to the client
//! verbatim. Callers discriminate bans from plain rate rejections: a ban is
//! terminal for the connection, a rate rejection only drops the current
//! message.

use std::fmt;

use thiserror::Error;

/// The two independent identity namespaces tracked for abuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Client IP address, known before any bytes are read.
    Ip,
    /// Application-level source identifier extracted from the message body.
    Source,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip => write!(f, "IP address"),
            Self::Source => write!(f, "source"),
        }
    }
}

/// Why a message (or connection) was refused admission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// Identity carries a permanent ban.
    #[error("{namespace} {key} is blacklisted")]
    Blacklisted { namespace: Namespace, key: String },

    /// Identity carries a timed ban that has not yet expired.
    #[error("{namespace} {key} is blacklisted for {remaining_secs} more seconds")]
    BlacklistedFor {
        namespace: Namespace,
        key: String,
        remaining_secs: u32,
    },

    /// Rolling per-minute quota exceeded; the message is rejected but the
    /// identity is not (yet) banned.
    #[error("{namespace} {key} has exceeded its message rate limit")]
    RateExceeded { namespace: Namespace, key: String },

    /// Offense threshold reached; the identity was just banned permanently.
    #[error("{namespace} {key} has exceeded its offense threshold and has been blacklisted")]
    BannedPermanently { namespace: Namespace, key: String },

    /// Offense threshold reached; the identity was just banned for
    /// `duration_secs` seconds.
    #[error("{namespace} {key} has exceeded its offense threshold and is now banned for {duration_secs} seconds")]
    Banned {
        namespace: Namespace,
        key: String,
        duration_secs: u32,
    },

    /// A per-minute limit of zero was configured.
    #[error("rate limiter capacity must be greater than zero")]
    ZeroCapacity,

    /// A bad-message blacklist threshold of zero was configured.
    #[error("offense threshold must be greater than zero")]
    ZeroThreshold,
}

impl AdmissionError {
    /// True when the identity was banned by (or before) this check. Terminal
    /// for the connection: stop all further processing.
    #[must_use]
    pub const fn is_ban(&self) -> bool {
        matches!(
            self,
            Self::Blacklisted { .. }
                | Self::BlacklistedFor { .. }
                | Self::BannedPermanently { .. }
                | Self::Banned { .. }
        )
    }
}

//! The abuse tracker: owns all mutable abuse state and makes admission
//! decisions.
//!
//! One [`IdentityTable`] per namespace (IP, source id), each holding the
//! sliding-window limiters, the blacklist, and the bad-format counters for
//! that namespace. The tracker is deliberately a plain `&mut self` structure
//! with explicit timestamps; the server serializes access with a single
//! mutex so a ban promotion (which touches two maps) is atomic relative to
//! other connections.

use std::collections::HashMap;
use std::num::NonZeroU32;

use loggate_config::ProtocolSettings;

use crate::error::{AdmissionError, Namespace};
use crate::sliding_window::SlidingWindow;

/// Per-namespace abuse state.
#[derive(Debug)]
struct IdentityTable {
    namespace: Namespace,
    /// Accepts per rolling minute for identities in this namespace.
    limit: NonZeroU32,
    /// Lazily created on first sight of an identity; lives for the process.
    limiters: HashMap<String, SlidingWindow>,
    /// Identity -> ban-start timestamp (unix seconds). Entries for expired
    /// timed bans are removed lazily on the first post-expiry check.
    banned: HashMap<String, u32>,
    /// Identity -> consecutive schema-validation failures. Only the source
    /// table accumulates entries; IP offenses accrue inside the limiter.
    bad_format: HashMap<String, u32>,
}

impl IdentityTable {
    fn new(namespace: Namespace, limit: NonZeroU32, seed_banned: &[String], now_secs: u32) -> Self {
        let banned = seed_banned
            .iter()
            .map(|key| (key.clone(), now_secs))
            .collect();
        Self {
            namespace,
            limit,
            limiters: HashMap::new(),
            banned,
            bad_format: HashMap::new(),
        }
    }

    fn register(&mut self, key: &str) {
        if !self.limiters.contains_key(key) {
            self.limiters
                .insert(key.to_string(), SlidingWindow::new(self.limit));
        }
    }

    /// Blacklist the identity and wipe its offense bookkeeping. The ban
    /// supersedes further counting.
    fn ban(&mut self, key: &str, now_secs: u32, policy: &BanPolicy) -> AdmissionError {
        self.banned.insert(key.to_string(), now_secs);
        if let Some(limiter) = self.limiters.get_mut(key) {
            limiter.reset();
        }
        self.bad_format.remove(key);

        if policy.permanent {
            AdmissionError::BannedPermanently {
                namespace: self.namespace,
                key: key.to_string(),
            }
        } else {
            AdmissionError::Banned {
                namespace: self.namespace,
                key: key.to_string(),
                duration_secs: policy.duration_secs,
            }
        }
    }

    fn check_blacklist(
        &mut self,
        key: &str,
        now_secs: u32,
        policy: &BanPolicy,
    ) -> Result<(), AdmissionError> {
        let Some(&banned_at) = self.banned.get(key) else {
            return Ok(());
        };

        if policy.permanent {
            return Err(AdmissionError::Blacklisted {
                namespace: self.namespace,
                key: key.to_string(),
            });
        }

        let served = now_secs.saturating_sub(banned_at);
        if served >= policy.duration_secs {
            // Served their time; unban exactly once.
            self.banned.remove(key);
            Ok(())
        } else {
            Err(AdmissionError::BlacklistedFor {
                namespace: self.namespace,
                key: key.to_string(),
                remaining_secs: policy.duration_secs - served,
            })
        }
    }

    fn check_rate(
        &mut self,
        key: &str,
        now_secs: u32,
        policy: &BanPolicy,
    ) -> Result<(), AdmissionError> {
        let limiter = self
            .limiters
            .entry(key.to_string())
            .or_insert_with(|| SlidingWindow::new(self.limit));

        let decision = limiter.check(now_secs);
        if !decision.exceeded {
            return Ok(());
        }

        if decision.offenses >= policy.offense_threshold {
            return Err(self.ban(key, now_secs, policy));
        }

        Err(AdmissionError::RateExceeded {
            namespace: self.namespace,
            key: key.to_string(),
        })
    }

    fn record_bad_format(
        &mut self,
        key: &str,
        now_secs: u32,
        policy: &BanPolicy,
    ) -> Result<(), AdmissionError> {
        let count = self.bad_format.entry(key.to_string()).or_insert(0);
        *count += 1;
        if *count >= policy.offense_threshold {
            return Err(self.ban(key, now_secs, policy));
        }
        Ok(())
    }
}

/// Ban promotion parameters shared by both namespaces.
#[derive(Debug, Clone)]
struct BanPolicy {
    offense_threshold: u32,
    duration_secs: u32,
    permanent: bool,
}

/// Tracks rate, format, and ban state for every identity the gateway has
/// seen, across both namespaces.
#[derive(Debug)]
pub struct AbuseTracker {
    ips: IdentityTable,
    sources: IdentityTable,
    policy: BanPolicy,
}

impl AbuseTracker {
    /// Build a tracker from protocol settings, seeding the blacklists with
    /// the configured pre-banned identities stamped at `now_secs`.
    ///
    /// # Errors
    /// Returns [`AdmissionError::ZeroCapacity`] if either per-minute limit
    /// is zero, or [`AdmissionError::ZeroThreshold`] if the offense
    /// threshold is.
    pub fn new(protocol: &ProtocolSettings, now_secs: u32) -> Result<Self, AdmissionError> {
        let ip_limit = NonZeroU32::new(protocol.messages_per_ip_per_minute)
            .ok_or(AdmissionError::ZeroCapacity)?;
        let source_limit = NonZeroU32::new(protocol.source_messages_per_minute())
            .ok_or(AdmissionError::ZeroCapacity)?;
        if protocol.bad_message_blacklist_threshold == 0 {
            return Err(AdmissionError::ZeroThreshold);
        }

        Ok(Self {
            ips: IdentityTable::new(
                Namespace::Ip,
                ip_limit,
                &protocol.blacklisted_ips,
                now_secs,
            ),
            sources: IdentityTable::new(
                Namespace::Source,
                source_limit,
                &protocol.blacklisted_sources,
                now_secs,
            ),
            policy: BanPolicy {
                offense_threshold: protocol.bad_message_blacklist_threshold,
                duration_secs: protocol.blacklist_duration_seconds,
                permanent: protocol.blacklist_permanent,
            },
        })
    }

    /// Lazily create limiters for both halves of an identity pair.
    /// Idempotent.
    pub fn register(&mut self, ip: &str, source_id: &str) {
        self.ips.register(ip);
        self.sources.register(source_id);
    }

    /// Reject identities that are currently banned. Timed bans whose
    /// duration has elapsed are removed here, on first post-expiry check.
    ///
    /// # Errors
    /// [`AdmissionError::Blacklisted`] or [`AdmissionError::BlacklistedFor`].
    pub fn check_blacklist(
        &mut self,
        namespace: Namespace,
        key: &str,
        now_secs: u32,
    ) -> Result<(), AdmissionError> {
        let policy = self.policy.clone();
        self.table_mut(namespace)
            .check_blacklist(key, now_secs, &policy)
    }

    /// Run the identity's sliding window. An exceeded quota rejects the
    /// message; reaching the offense threshold additionally promotes the
    /// identity to the blacklist and returns a ban error, which callers must
    /// treat as terminal.
    ///
    /// # Errors
    /// [`AdmissionError::RateExceeded`], [`AdmissionError::Banned`], or
    /// [`AdmissionError::BannedPermanently`].
    pub fn check_rate(
        &mut self,
        namespace: Namespace,
        key: &str,
        now_secs: u32,
    ) -> Result<(), AdmissionError> {
        let policy = self.policy.clone();
        self.table_mut(namespace).check_rate(key, now_secs, &policy)
    }

    /// Count one schema-validation failure against a source id. The
    /// threshold-th consecutive failure bans the source and resets its
    /// counter. A valid message in between wipes the streak; see
    /// [`Self::clear_bad_format`].
    ///
    /// # Errors
    /// [`AdmissionError::Banned`] or [`AdmissionError::BannedPermanently`]
    /// when the failure triggers a ban.
    pub fn record_bad_format(
        &mut self,
        source_id: &str,
        now_secs: u32,
    ) -> Result<(), AdmissionError> {
        let policy = self.policy.clone();
        self.sources.record_bad_format(source_id, now_secs, &policy)
    }

    /// Wipe a source's bad-format streak. Called when the source sends a
    /// schema-valid message, so only consecutive failures count toward a
    /// ban.
    pub fn clear_bad_format(&mut self, source_id: &str) {
        self.sources.bad_format.remove(source_id);
    }

    /// Ban-start timestamp for an identity, if currently blacklisted.
    #[must_use]
    pub fn ban_started_at(&self, namespace: Namespace, key: &str) -> Option<u32> {
        self.table(namespace).banned.get(key).copied()
    }

    /// Consecutive rate offenses recorded against an identity.
    #[must_use]
    pub fn offenses(&self, namespace: Namespace, key: &str) -> u32 {
        self.table(namespace)
            .limiters
            .get(key)
            .map_or(0, SlidingWindow::offenses)
    }

    /// Consecutive bad-format failures recorded against a source id.
    #[must_use]
    pub fn bad_format_count(&self, source_id: &str) -> u32 {
        self.sources.bad_format.get(source_id).copied().unwrap_or(0)
    }

    const fn table(&self, namespace: Namespace) -> &IdentityTable {
        match namespace {
            Namespace::Ip => &self.ips,
            Namespace::Source => &self.sources,
        }
    }

    fn table_mut(&mut self, namespace: Namespace) -> &mut IdentityTable {
        match namespace {
            Namespace::Ip => &mut self.ips,
            Namespace::Source => &mut self.sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol(ip_limit: u32, threshold: u32, duration: u32, permanent: bool) -> ProtocolSettings {
        ProtocolSettings {
            incoming_json_schema: String::new(),
            messages_per_ip_per_minute: ip_limit,
            messages_per_source_per_minute: None,
            bad_message_blacklist_threshold: threshold,
            blacklisted_ips: Vec::new(),
            blacklisted_sources: Vec::new(),
            blacklist_permanent: permanent,
            blacklist_duration_seconds: duration,
            incoming_message_schema: String::new(),
        }
    }

    fn tracker(ip_limit: u32, threshold: u32, duration: u32) -> AbuseTracker {
        AbuseTracker::new(&protocol(ip_limit, threshold, duration, false), 1000).unwrap()
    }

    #[test]
    fn zero_limit_fails_construction() {
        let err = AbuseTracker::new(&protocol(0, 3, 60, false), 0).unwrap_err();
        assert_eq!(err, AdmissionError::ZeroCapacity);

        let err = AbuseTracker::new(&protocol(5, 0, 60, false), 0).unwrap_err();
        assert_eq!(err, AdmissionError::ZeroThreshold);
    }

    #[test]
    fn rate_rejection_below_threshold_is_not_a_ban() {
        let mut t = tracker(1, 3, 600);
        assert!(t.check_rate(Namespace::Ip, "1.2.3.4", 1000).is_ok());

        let err = t.check_rate(Namespace::Ip, "1.2.3.4", 1001).unwrap_err();
        assert_eq!(
            err,
            AdmissionError::RateExceeded {
                namespace: Namespace::Ip,
                key: "1.2.3.4".into()
            }
        );
        assert!(!err.is_ban());
        assert!(t.ban_started_at(Namespace::Ip, "1.2.3.4").is_none());
    }

    #[test]
    fn offense_threshold_promotes_to_ban_and_resets_counters() {
        let mut t = tracker(1, 3, 600);
        assert!(t.check_rate(Namespace::Ip, "1.2.3.4", 1000).is_ok());

        // Two plain rejections, then the third offense bans.
        assert!(!t.check_rate(Namespace::Ip, "1.2.3.4", 1001).unwrap_err().is_ban());
        assert!(!t.check_rate(Namespace::Ip, "1.2.3.4", 1002).unwrap_err().is_ban());
        let err = t.check_rate(Namespace::Ip, "1.2.3.4", 1003).unwrap_err();
        assert!(err.is_ban());

        assert_eq!(t.ban_started_at(Namespace::Ip, "1.2.3.4"), Some(1003));
        assert_eq!(t.offenses(Namespace::Ip, "1.2.3.4"), 0);
    }

    #[test]
    fn permanent_ban_never_expires() {
        let mut t = AbuseTracker::new(&protocol(5, 2, 10, true), 1000).unwrap();
        t.record_bad_format("dev-1", 1000).unwrap();
        assert!(t.record_bad_format("dev-1", 1001).is_err());

        for now in [1002, 2000, 1_000_000] {
            let err = t.check_blacklist(Namespace::Source, "dev-1", now).unwrap_err();
            assert_eq!(
                err,
                AdmissionError::Blacklisted {
                    namespace: Namespace::Source,
                    key: "dev-1".into()
                }
            );
        }
    }

    #[test]
    fn timed_ban_expires_once_and_allows_rebanning() {
        let mut t = tracker(1, 1, 100);
        assert!(t.check_rate(Namespace::Ip, "1.2.3.4", 1000).is_ok());
        assert!(t.check_rate(Namespace::Ip, "1.2.3.4", 1001).unwrap_err().is_ban());

        // Still banned one second before expiry, with remaining time reported.
        let err = t.check_blacklist(Namespace::Ip, "1.2.3.4", 1100).unwrap_err();
        assert_eq!(
            err,
            AdmissionError::BlacklistedFor {
                namespace: Namespace::Ip,
                key: "1.2.3.4".into(),
                remaining_secs: 1,
            }
        );

        // Expired: removed exactly once, subsequent checks pass.
        assert!(t.check_blacklist(Namespace::Ip, "1.2.3.4", 1101).is_ok());
        assert!(t.check_blacklist(Namespace::Ip, "1.2.3.4", 1102).is_ok());
        assert!(t.ban_started_at(Namespace::Ip, "1.2.3.4").is_none());

        // Re-banning after expiry is possible. The ban reset the limiter, so
        // one accept fits before the window fills again.
        assert!(t.check_rate(Namespace::Ip, "1.2.3.4", 1102).is_ok());
        assert!(t.check_rate(Namespace::Ip, "1.2.3.4", 1103).unwrap_err().is_ban());
        assert_eq!(t.ban_started_at(Namespace::Ip, "1.2.3.4"), Some(1103));
    }

    #[test]
    fn bad_format_bans_on_threshold_and_resets_counter() {
        let mut t = tracker(5, 3, 600);

        assert!(t.record_bad_format("dev-1", 1000).is_ok());
        assert!(t.record_bad_format("dev-1", 1001).is_ok());
        assert_eq!(t.bad_format_count("dev-1"), 2);

        let err = t.record_bad_format("dev-1", 1002).unwrap_err();
        assert_eq!(
            err,
            AdmissionError::Banned {
                namespace: Namespace::Source,
                key: "dev-1".into(),
                duration_secs: 600,
            }
        );
        assert_eq!(t.bad_format_count("dev-1"), 0);
        assert_eq!(t.ban_started_at(Namespace::Source, "dev-1"), Some(1002));
    }

    #[test]
    fn valid_message_wipes_bad_format_streak() {
        let mut t = tracker(5, 2, 600);

        assert!(t.record_bad_format("dev-1", 1000).is_ok());
        assert_eq!(t.bad_format_count("dev-1"), 1);

        // A schema-valid message in between restarts the streak.
        t.clear_bad_format("dev-1");
        assert_eq!(t.bad_format_count("dev-1"), 0);

        assert!(t.record_bad_format("dev-1", 1001).is_ok());
        assert!(t.record_bad_format("dev-1", 1002).unwrap_err().is_ban());
    }

    #[test]
    fn seeded_blacklists_apply_from_startup() {
        let mut settings = protocol(5, 3, 600, false);
        settings.blacklisted_ips = vec!["10.0.0.66".into()];
        settings.blacklisted_sources = vec!["rogue".into()];
        let mut t = AbuseTracker::new(&settings, 5000).unwrap();

        assert!(t.check_blacklist(Namespace::Ip, "10.0.0.66", 5001).is_err());
        assert!(t.check_blacklist(Namespace::Source, "rogue", 5001).is_err());
        // Seeded bans serve the configured duration from startup time.
        assert!(t.check_blacklist(Namespace::Ip, "10.0.0.66", 5600).is_ok());
    }

    #[test]
    fn namespaces_are_independent() {
        let mut t = tracker(1, 1, 600);
        assert!(t.check_rate(Namespace::Ip, "key", 1000).is_ok());
        // Same key string, different namespace: separate limiter.
        assert!(t.check_rate(Namespace::Source, "key", 1000).is_ok());
    }

    #[test]
    fn register_is_idempotent_and_preserves_offenses() {
        let mut t = tracker(1, 5, 600);
        t.register("1.2.3.4", "dev-1");
        assert!(t.check_rate(Namespace::Ip, "1.2.3.4", 1000).is_ok());
        assert!(t.check_rate(Namespace::Ip, "1.2.3.4", 1001).is_err());
        assert_eq!(t.offenses(Namespace::Ip, "1.2.3.4"), 1);

        t.register("1.2.3.4", "dev-1");
        assert_eq!(t.offenses(Namespace::Ip, "1.2.3.4"), 1);
    }

    #[test]
    fn empty_source_id_is_a_trackable_identity() {
        let mut t = tracker(1, 2, 600);
        t.register("1.2.3.4", "");
        assert!(t.check_rate(Namespace::Source, "", 1000).is_ok());
        assert!(t.check_rate(Namespace::Source, "", 1001).is_err());
        assert!(t.check_rate(Namespace::Source, "", 1002).unwrap_err().is_ban());
        assert!(t.check_blacklist(Namespace::Source, "", 1003).is_err());
    }
}

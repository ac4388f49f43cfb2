//! # Window-bounded deduplication.
//!
//! [`Deduplicator`] answers one question per message: has an identical
//! fingerprint been seen inside the sliding window?
//!
//! ## Fingerprint
//! Digest over the canonical byte form of
//! `topic | body | id | k=v | k=v | ...` (tags in key order, `|` delimiter).
//! The message identifier participates in the fingerprint: two independently
//! generated messages with identical topic and body are only dedup-equivalent
//! when the caller supplies the same identifier.
//!
//! ## Concurrency
//! The fingerprint map is a [`DashMap`]; the entry API gives race-free
//! insert-if-absent, so the first writer wins without external locking.
//!
//! ## Eviction
//! [`Deduplicator::sweep`] runs on a 60s cadence (driven by the processor):
//! entries older than the window are dropped, then, if the cache still
//! exceeds its cap, the oldest entries go until the cache holds at most
//! `max - 1000`. The slack keeps consecutive sweeps from thrashing around
//! the cap.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::DedupConfig;
use crate::message::{now_millis, Message};

/// Cadence of the background eviction pass.
pub(crate) const SWEEP_INTERVAL_MS: u64 = 60_000;

/// Slack kept under the cap after a size eviction.
const EVICTION_SLACK: usize = 1000;

/// Outcome of a dedup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// First sighting inside the window.
    Unique,
    /// Same fingerprint seen inside the window.
    Duplicate,
}

#[derive(Debug, Clone, Copy)]
enum DigestKind {
    Sha256,
    /// Non-cryptographic fallback for unrecognized algorithm names.
    Fallback,
}

/// Sliding-window uniqueness filter keyed by message fingerprint.
pub struct Deduplicator {
    config: DedupConfig,
    digest: DigestKind,
    entries: DashMap<String, u64>,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        let digest = match config.digest_algorithm.as_str() {
            "SHA-256" | "sha-256" | "sha256" => DigestKind::Sha256,
            other => {
                warn!(
                    algorithm = other,
                    "unknown digest algorithm, falling back to non-cryptographic hash"
                );
                DigestKind::Fallback
            }
        };
        Self {
            config,
            digest,
            entries: DashMap::new(),
        }
    }

    /// Checks a message against the window. Called at most once per message.
    ///
    /// A hit outside the window refreshes the stored timestamp and counts as
    /// unique (sliding window).
    pub fn check(&self, message: &Message) -> DedupDecision {
        self.check_at(message, now_millis())
    }

    fn check_at(&self, message: &Message, now: u64) -> DedupDecision {
        let fingerprint = self.fingerprint(message);
        let window = self.config.window.as_millis() as u64;

        match self.entries.entry(fingerprint) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(now);
                DedupDecision::Unique
            }
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                let seen_at = *slot.get();
                if now.saturating_sub(seen_at) <= window {
                    debug!(id = message.id(), "duplicate inside window");
                    DedupDecision::Duplicate
                } else {
                    slot.insert(now);
                    DedupDecision::Unique
                }
            }
        }
    }

    /// Canonical fingerprint of a message.
    pub fn fingerprint(&self, message: &Message) -> String {
        let mut canonical = String::new();
        canonical.push_str(message.topic());
        canonical.push('|');
        canonical.push_str(message.body());
        canonical.push('|');
        canonical.push_str(message.id());
        canonical.push('|');
        for (key, value) in message.tags() {
            canonical.push_str(key);
            canonical.push('=');
            canonical.push_str(value);
            canonical.push('|');
        }

        match self.digest {
            DigestKind::Sha256 => hex::encode(Sha256::digest(canonical.as_bytes())),
            DigestKind::Fallback => {
                let mut hasher = DefaultHasher::new();
                canonical.hash(&mut hasher);
                format!("{:016x}", hasher.finish())
            }
        }
    }

    /// One eviction pass: window expiry first, then size-cap eviction of the
    /// oldest entries down to `max - 1000`.
    pub fn sweep(&self) {
        self.sweep_at(now_millis());
    }

    fn sweep_at(&self, now: u64) {
        let horizon = now.saturating_sub(self.config.window.as_millis() as u64);
        self.entries.retain(|_, seen_at| *seen_at >= horizon);

        let size = self.entries.len();
        if size > self.config.max_cache_size {
            let surplus = size - self.config.max_cache_size + EVICTION_SLACK;
            let mut by_age: Vec<(String, u64)> = self
                .entries
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect();
            by_age.sort_by_key(|(_, seen_at)| *seen_at);
            for (key, _) in by_age.into_iter().take(surplus) {
                self.entries.remove(&key);
            }
        }

        debug!(size = self.entries.len(), "dedup cache sweep complete");
    }

    /// Cache occupancy snapshot.
    pub fn stats(&self) -> DedupStats {
        DedupStats {
            size: self.entries.len(),
            max_size: self.config.max_cache_size,
        }
    }
}

/// Occupancy of the dedup cache.
#[derive(Debug, Clone, Copy)]
pub struct DedupStats {
    /// Live fingerprints.
    pub size: usize,
    /// Configured cap.
    pub max_size: usize,
}

impl DedupStats {
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            return 0.0;
        }
        self.size as f64 / self.max_size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupConfig;
    use std::time::Duration;

    fn dedup(window: Duration) -> Deduplicator {
        Deduplicator::new(DedupConfig {
            window,
            ..DedupConfig::default()
        })
    }

    #[test]
    fn second_sighting_inside_window_is_duplicate() {
        let d = dedup(Duration::from_secs(30));
        let msg = Message::new("ORDER", "x").with_id("DUP-1");
        assert_eq!(d.check_at(&msg, 1_000), DedupDecision::Unique);
        assert_eq!(d.check_at(&msg, 1_010), DedupDecision::Duplicate);
    }

    #[test]
    fn sighting_outside_window_refreshes_and_passes() {
        let d = dedup(Duration::from_millis(100));
        let msg = Message::new("ORDER", "x").with_id("DUP-1");
        assert_eq!(d.check_at(&msg, 1_000), DedupDecision::Unique);
        assert_eq!(d.check_at(&msg, 1_200), DedupDecision::Unique);
        // The refresh restarts the window.
        assert_eq!(d.check_at(&msg, 1_250), DedupDecision::Duplicate);
    }

    #[test]
    fn identifier_participates_in_fingerprint() {
        let d = dedup(Duration::from_secs(30));
        let a = Message::new("ORDER", "x").with_id("a");
        let b = Message::new("ORDER", "x").with_id("b");
        assert_ne!(d.fingerprint(&a), d.fingerprint(&b));
        assert_eq!(d.check_at(&a, 1_000), DedupDecision::Unique);
        assert_eq!(d.check_at(&b, 1_001), DedupDecision::Unique);
    }

    #[test]
    fn tags_participate_in_key_order() {
        let d = dedup(Duration::from_secs(30));
        let a = Message::new("t", "b").with_id("m").with_tag("x", "1").with_tag("y", "2");
        let b = Message::new("t", "b").with_id("m").with_tag("y", "2").with_tag("x", "1");
        assert_eq!(d.fingerprint(&a), d.fingerprint(&b));
    }

    #[test]
    fn unknown_algorithm_falls_back() {
        let d = Deduplicator::new(DedupConfig {
            digest_algorithm: "MD-999".to_string(),
            ..DedupConfig::default()
        });
        let msg = Message::new("t", "b").with_id("m");
        assert_eq!(d.fingerprint(&msg).len(), 16);
        assert_eq!(d.check_at(&msg, 1_000), DedupDecision::Unique);
        assert_eq!(d.check_at(&msg, 1_001), DedupDecision::Duplicate);
    }

    #[test]
    fn sweep_drops_expired_then_enforces_cap() {
        let d = Deduplicator::new(DedupConfig {
            window: Duration::from_millis(100),
            max_cache_size: 10,
            ..DedupConfig::default()
        });
        for i in 0..2000 {
            let msg = Message::new("t", "b").with_id(format!("m-{i}"));
            d.check_at(&msg, 50_000 + i);
        }
        assert_eq!(d.stats().size, 2000);

        // Everything is inside the window, so only the size cap applies;
        // eviction leaves nothing because the slack exceeds the cap.
        d.sweep_at(50_000 + 2000);
        assert!(d.stats().size <= 10);
    }

    #[test]
    fn sweep_expires_old_entries() {
        let d = dedup(Duration::from_millis(100));
        let old = Message::new("t", "b").with_id("old");
        let fresh = Message::new("t", "b").with_id("fresh");
        d.check_at(&old, 1_000);
        d.check_at(&fresh, 10_000);
        d.sweep_at(10_050);
        assert_eq!(d.stats().size, 1);
    }
}

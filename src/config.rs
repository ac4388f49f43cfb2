//! # Engine configuration.
//!
//! [`Config`] bundles the per-subsystem settings: dedup window, token bucket,
//! ordered release, per-state timeouts, retry backoff, plus the pacing and
//! shutdown knobs of the engine itself. It is immutable once a processor has
//! been constructed from it.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use fluxq::{Config, MsgState};
//!
//! let mut cfg = Config::default();
//! cfg.rate_limit.tokens_per_second = 50;
//! cfg.ordering.enabled = true;
//! cfg.retry.max_retries = 5;
//! cfg.timeouts.set(MsgState::Sending, Duration::from_secs(10));
//!
//! assert_eq!(cfg.timeouts.for_state(MsgState::Sending), Duration::from_secs(10));
//! ```

use std::collections::HashMap;
use std::time::Duration;

use crate::admission::LatePolicy;
use crate::message::MsgState;

/// Global configuration for the processor and its collaborators.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Deduplication window settings.
    pub dedup: DedupConfig,
    /// Token bucket settings.
    pub rate_limit: RateLimitConfig,
    /// Ordered release settings.
    pub ordering: OrderingConfig,
    /// Per-state deadlines.
    pub timeouts: TimeoutConfig,
    /// Retry backoff settings.
    pub retry: RetryConfig,
    /// Engine pacing and shutdown settings.
    pub engine: EngineConfig,
}

/// Settings for the sliding-window deduplicator.
#[derive(Clone, Debug)]
pub struct DedupConfig {
    /// How long a fingerprint stays "seen".
    pub window: Duration,
    /// Cache size cap enforced by the sweeper.
    pub max_cache_size: usize,
    /// Digest used for the fingerprint. Unknown values fall back to a
    /// non-cryptographic hash with a warning.
    pub digest_algorithm: String,
}

impl Default for DedupConfig {
    /// `window = 5min`, `max_cache_size = 100_000`, `digest = "SHA-256"`.
    fn default() -> Self {
        Self {
            window: Duration::from_secs(300),
            max_cache_size: 100_000,
            digest_algorithm: "SHA-256".to_string(),
        }
    }
}

/// Settings for the token bucket limiter.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// Steady-state refill rate.
    pub tokens_per_second: u64,
    /// Burst capacity of the bucket.
    pub capacity: u64,
    /// Tick interval for re-checking parked messages.
    pub recovery_check_interval: Duration,
}

impl Default for RateLimitConfig {
    /// `tokens_per_second = 100`, `capacity = 200`, `recovery tick = 100ms`.
    fn default() -> Self {
        Self {
            tokens_per_second: 100,
            capacity: 200,
            recovery_check_interval: Duration::from_millis(100),
        }
    }
}

/// Settings for the per-partition ordering coordinator.
#[derive(Clone, Debug)]
pub struct OrderingConfig {
    /// Whether ordered release is enforced at all.
    pub enabled: bool,
    /// Partition key used when a message carries neither a partition tag nor
    /// a topic.
    pub ordering_key: String,
    /// Upper bound on how long a parked message should wait.
    pub max_wait: Duration,
    /// Bound on each partition's waiting queue. On overflow the oldest parked
    /// entry is evicted.
    pub max_pending_messages: usize,
    /// What to do with a sequence that is already behind the partition cursor.
    pub late_policy: LatePolicy,
}

impl Default for OrderingConfig {
    /// Disabled; `key = "default"`, `max_wait = 5s`, `max_pending = 1000`,
    /// late arrivals park and run into the ordering-wait timeout.
    fn default() -> Self {
        Self {
            enabled: false,
            ordering_key: "default".to_string(),
            max_wait: Duration::from_secs(5),
            max_pending_messages: 1000,
            late_policy: LatePolicy::Park,
        }
    }
}

/// Per-state deadlines with a fallback for everything unlisted.
#[derive(Clone, Debug)]
pub struct TimeoutConfig {
    overrides: HashMap<MsgState, Duration>,
    fallback: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let mut overrides = HashMap::new();
        overrides.insert(MsgState::DedupChecking, Duration::from_secs(5));
        overrides.insert(MsgState::RateLimiting, Duration::from_secs(3));
        overrides.insert(MsgState::Preprocessing, Duration::from_secs(10));
        overrides.insert(MsgState::Sending, Duration::from_secs(30));
        overrides.insert(MsgState::Sent, Duration::from_secs(60));
        overrides.insert(MsgState::OrderingWait, Duration::from_secs(15));
        Self {
            overrides,
            fallback: Duration::from_secs(30),
        }
    }
}

impl TimeoutConfig {
    /// Deadline for a state, falling back to the default when unlisted.
    pub fn for_state(&self, state: MsgState) -> Duration {
        self.overrides.get(&state).copied().unwrap_or(self.fallback)
    }

    /// Overrides the deadline for one state.
    pub fn set(&mut self, state: MsgState, timeout: Duration) -> &mut Self {
        self.overrides.insert(state, timeout);
        self
    }
}

/// Retry backoff settings.
///
/// The delay scheduled after retry `n` has been admitted is
/// `base_delay * backoff_multiplier^n`, capped at `max_delay`.
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    /// Initial delay before the first retry.
    pub base_delay: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub backoff_multiplier: f64,
    /// Cap applied after growth.
    pub max_delay: Duration,
    /// Default retry budget for submitted messages.
    pub max_retries: u32,
}

impl Default for RetryConfig {
    /// `base = 1s`, `multiplier = 2.0`, `max = 60s`, `max_retries = 3`.
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

impl RetryConfig {
    /// Computes the backoff delay for the given retry count, capped at
    /// [`RetryConfig::max_delay`]. Non-finite growth saturates at the cap.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry_count as i32);
        if !factor.is_finite() {
            return self.max_delay;
        }
        let delay = self.base_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

/// Pacing and shutdown knobs of the engine itself.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Delay before each auto-advance step.
    pub pacing: Duration,
    /// How often the submitter polls for a terminal state.
    pub poll_interval: Duration,
    /// Overall deadline for a single submission to resolve.
    pub submit_deadline: Duration,
    /// Maximum time to wait for scheduled work during shutdown before
    /// cancelling the stragglers.
    pub grace: Duration,
}

impl Default for EngineConfig {
    /// `pacing = 100ms`, `poll = 50ms`, `submit deadline = 30s`, `grace = 5s`.
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
            submit_deadline: Duration::from_secs(30),
            grace: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_fallback_applies_to_unlisted_states() {
        let cfg = TimeoutConfig::default();
        assert_eq!(cfg.for_state(MsgState::Sending), Duration::from_secs(30));
        assert_eq!(cfg.for_state(MsgState::SendPaused), Duration::from_secs(30));
        assert_eq!(cfg.for_state(MsgState::Sent), Duration::from_secs(60));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig {
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(5),
            max_retries: 2,
        };
        assert_eq!(retry.delay_for(0), Duration::from_millis(500));
        assert_eq!(retry.delay_for(1), Duration::from_millis(750));
        assert_eq!(retry.delay_for(2), Duration::from_millis(1125));
        assert_eq!(retry.delay_for(30), Duration::from_secs(5));
    }

    #[test]
    fn constant_backoff_with_unit_multiplier() {
        let retry = RetryConfig {
            backoff_multiplier: 1.0,
            ..RetryConfig::default()
        };
        assert_eq!(retry.delay_for(0), retry.base_delay);
        assert_eq!(retry.delay_for(7), retry.base_delay);
    }
}

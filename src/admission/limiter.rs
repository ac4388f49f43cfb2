//! # Token bucket rate limiter with lazy refill.
//!
//! [`RateLimiter`] makes an admit-or-reject decision per message. Tokens are
//! drained with a CAS loop, so concurrent callers can never over-grant.
//! Refill is lazy: the caller that observes at least 100ms since the last
//! refill performs it under a try-lock with a double-check, adding
//! `elapsed * rate / 1000` tokens capped at the bucket capacity.
//!
//! ## Rules
//! - At most one refill per 100ms regardless of contention.
//! - A caller that loses the try-lock proceeds with the tokens it can see;
//!   nobody ever blocks on the refill lock.
//! - The limiter never fails: the answer is always granted or rejected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Minimum gap between two refills.
const REFILL_INTERVAL_MS: u64 = 100;

/// Token bucket with atomic accounting.
pub struct RateLimiter {
    config: RateLimitConfig,
    tokens: AtomicU64,
    /// Milliseconds since `birth` of the last applied refill.
    last_refill: AtomicU64,
    refill_lock: Mutex<()>,
    birth: Instant,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            tokens: AtomicU64::new(config.capacity),
            last_refill: AtomicU64::new(0),
            refill_lock: Mutex::new(()),
            birth: Instant::now(),
            config,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.birth.elapsed().as_millis() as u64
    }

    /// Tries to take `n` tokens. Never blocks.
    pub fn try_acquire(&self, n: u64) -> bool {
        self.try_acquire_at(n, self.elapsed_ms())
    }

    fn try_acquire_at(&self, n: u64, now: u64) -> bool {
        self.refill_at(now);

        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current < n {
                debug!(requested = n, available = current, "rate limit exceeded");
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - n, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
            // Lost the race; re-read and retry.
        }
    }

    fn refill_at(&self, now: u64) {
        let last = self.last_refill.load(Ordering::Acquire);
        if now.saturating_sub(last) < REFILL_INTERVAL_MS {
            return;
        }

        if let Some(_guard) = self.refill_lock.try_lock() {
            // Double-check under the lock; another caller may have refilled
            // while we were acquiring it.
            let last = self.last_refill.load(Ordering::Acquire);
            let elapsed = now.saturating_sub(last);
            if elapsed < REFILL_INTERVAL_MS {
                return;
            }

            let to_add = elapsed * self.config.tokens_per_second / 1000;
            if to_add > 0 {
                let current = self.tokens.load(Ordering::Acquire);
                let refilled = current.saturating_add(to_add).min(self.config.capacity);
                self.tokens.store(refilled, Ordering::Release);
                self.last_refill.store(now, Ordering::Release);
                debug!(added = to_add, total = refilled, "refilled tokens");
            }
            // to_add == 0 leaves last_refill untouched so fractional credit
            // keeps accumulating for slow rates.
        }
    }

    /// Tokens currently available, after a refill attempt.
    pub fn available(&self) -> u64 {
        self.refill_at(self.elapsed_ms());
        self.tokens.load(Ordering::Acquire)
    }

    /// Bucket snapshot.
    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            available: self.available(),
            capacity: self.config.capacity,
            tokens_per_second: self.config.tokens_per_second,
        }
    }
}

/// Occupancy of the token bucket.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitStats {
    pub available: u64,
    pub capacity: u64,
    pub tokens_per_second: u64,
}

impl RateLimitStats {
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        1.0 - self.available as f64 / self.capacity as f64
    }
}

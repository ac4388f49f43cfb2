//! Admission control: deduplication, rate limiting, ordered release.
//!
//! The three components here decide whether and when a message may progress
//! past the admission phase. They are owned by the processor and shared by
//! every state machine it creates; none of them blocks, and each returns a
//! plain decision that the machine turns into a transition.
//!
//! - [`Deduplicator`] window-bounded uniqueness by message fingerprint
//! - [`RateLimiter`] token bucket with lazy refill
//! - [`OrderingCoordinator`] per-partition release strictly by sequence

mod dedup;
mod limiter;
mod ordering;

pub use dedup::{DedupDecision, DedupStats, Deduplicator};
pub use limiter::{RateLimitStats, RateLimiter};
pub use ordering::{LatePolicy, OrderDecision, OrderingCoordinator, OrderingStats};

pub(crate) use dedup::SWEEP_INTERVAL_MS;

//! # Message lifecycle states.
//!
//! [`MsgState`] covers the full pipeline a message moves through:
//! - **Admission**: dedup check, rate limiting, queueing, ordered release, preprocessing
//! - **Transport**: sending, awaiting confirmation
//! - **Failure**: failed, retry sub-loop, timeout, dead letter
//! - **Lifecycle**: expired, cancelled, archiving
//!
//! ## Rules
//! - The state stored on the message is the single source of truth for its
//!   position in the pipeline.
//! - Terminal states admit no progression except archiving (and a reset out of
//!   the dead letter).
//! - Parked states wait for an external or scheduled stimulus; the machine
//!   never blocks a thread while a message is parked.

/// Position of a message in the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgState {
    /// Just created, not yet admitted.
    Init,
    /// Uniqueness check against the dedup window is running.
    DedupChecking,
    /// Found to be a duplicate inside the window; dropped.
    Duplicate,
    /// Token bucket admission is running.
    RateLimiting,
    /// Rejected by the limiter; parked until tokens recover.
    RateLimited,
    /// Admitted; waiting in the processing queue.
    Queued,
    /// Waiting for the preceding sequence in its partition.
    OrderingWait,
    /// Payload preparation before dispatch.
    Preprocessing,
    /// Handed to the transport.
    Sending,
    /// Dispatch paused; resumable.
    SendPaused,
    /// Accepted by the transport; waiting for confirmation.
    Sent,
    /// A subset of consumers confirmed (multicast).
    PartialConfirmed,
    /// Fully confirmed.
    Confirmed,
    /// Last attempt failed.
    Failed,
    /// Retry admitted; deciding between immediate and delayed retry.
    RetryPreparing,
    /// Re-dispatching.
    Retrying,
    /// Backoff delay before the next attempt.
    RetryDelayed,
    /// A per-state deadline elapsed.
    Timeout,
    /// Retries exhausted; routed to the dead letter.
    DeadLetter,
    /// Expiry timestamp passed before completion.
    Expired,
    /// Explicitly cancelled.
    Cancelled,
    /// Archive in progress.
    Archiving,
    /// Archived; nothing more will happen.
    Archived,
}

impl MsgState {
    /// True for states from which no progression except archiving is defined.
    ///
    /// `DeadLetter` is terminal but additionally accepts a reset back to `Init`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MsgState::Confirmed
                | MsgState::Duplicate
                | MsgState::DeadLetter
                | MsgState::Expired
                | MsgState::Cancelled
                | MsgState::Archived
        )
    }

    /// True for states that wait on an external or scheduled stimulus.
    pub fn is_parked(self) -> bool {
        matches!(
            self,
            MsgState::RateLimited
                | MsgState::OrderingWait
                | MsgState::RetryDelayed
                | MsgState::SendPaused
        )
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            MsgState::Init => "init",
            MsgState::DedupChecking => "dedup_checking",
            MsgState::Duplicate => "duplicate",
            MsgState::RateLimiting => "rate_limiting",
            MsgState::RateLimited => "rate_limited",
            MsgState::Queued => "queued",
            MsgState::OrderingWait => "ordering_wait",
            MsgState::Preprocessing => "preprocessing",
            MsgState::Sending => "sending",
            MsgState::SendPaused => "send_paused",
            MsgState::Sent => "sent",
            MsgState::PartialConfirmed => "partial_confirmed",
            MsgState::Confirmed => "confirmed",
            MsgState::Failed => "failed",
            MsgState::RetryPreparing => "retry_preparing",
            MsgState::Retrying => "retrying",
            MsgState::RetryDelayed => "retry_delayed",
            MsgState::Timeout => "timeout",
            MsgState::DeadLetter => "dead_letter",
            MsgState::Expired => "expired",
            MsgState::Cancelled => "cancelled",
            MsgState::Archiving => "archiving",
            MsgState::Archived => "archived",
        }
    }
}

impl std::fmt::Display for MsgState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

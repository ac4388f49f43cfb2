//! # Stimuli that drive the per-message state machine.
//!
//! [`StateEvent`] values fall into three families:
//! - **Progression**: the pipeline moving forward (start, pass checks, send, confirm)
//! - **Failure/control**: failures, timeouts, cancellation, pause/resume
//! - **Retry flow**: preparing, delaying and resuming retries
//!
//! The three `Check*` events are fired by the scheduler; their pre-transition
//! work consults the matching admission component and substitutes the
//! effective outcome event (pass, duplicate, exceeded, ready) before the
//! transition is committed.

/// A discrete stimulus that may advance a message's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateEvent {
    // === Progression ===
    /// Admission begins.
    StartProcessing,
    /// Run the dedup check (substituted by its outcome).
    CheckDedup,
    /// Dedup check passed.
    DedupPass,
    /// Dedup check found a duplicate inside the window.
    DedupDuplicate,
    /// Run the token bucket check (substituted by its outcome).
    CheckRateLimit,
    /// A token was acquired.
    RateLimitPass,
    /// No token available.
    RateLimitExceeded,
    /// A parked message acquired a token on a recovery tick.
    RateLimitRecovered,
    /// Consult the ordering gate (substituted by its outcome).
    CheckOrder,
    /// The partition cursor reached this message's sequence.
    OrderReady,
    /// Move into preprocessing (unordered path).
    Preprocess,
    /// Preprocessing finished.
    PreprocessComplete,
    /// The transport accepted the message.
    Sent,
    /// A subset of consumers confirmed.
    PartialConfirm,
    /// Full confirmation.
    Confirm,

    // === Failure / control ===
    /// The current attempt failed.
    Fail,
    /// A per-state deadline elapsed.
    Timeout,
    /// Explicit cancellation.
    Cancel,
    /// The expiry deadline passed before admission.
    Expire,
    /// Pause an in-flight dispatch.
    PauseSend,
    /// Resume a paused dispatch.
    ResumeSend,
    /// The retry budget is exhausted.
    MaxRetriesExceeded,

    // === Retry flow ===
    /// Admit a retry attempt (guarded by the budget).
    PrepareRetry,
    /// Start the retry immediately.
    Retry,
    /// Schedule the retry after a backoff delay.
    DelayRetry,
    /// The backoff delay elapsed.
    RetryResume,

    // === Archival ===
    /// Begin archiving a settled message.
    Archive,
    /// Archiving finished.
    ArchiveComplete,
    /// Pull a message out of the dead letter and restart it.
    Reset,
}

impl StateEvent {
    /// True for the scheduler-fired events whose pre-transition work consults
    /// an admission component.
    pub fn is_admission_check(self) -> bool {
        matches!(
            self,
            StateEvent::CheckDedup | StateEvent::CheckRateLimit | StateEvent::CheckOrder
        )
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            StateEvent::StartProcessing => "start_processing",
            StateEvent::CheckDedup => "check_dedup",
            StateEvent::DedupPass => "dedup_pass",
            StateEvent::DedupDuplicate => "dedup_duplicate",
            StateEvent::CheckRateLimit => "check_rate_limit",
            StateEvent::RateLimitPass => "rate_limit_pass",
            StateEvent::RateLimitExceeded => "rate_limit_exceeded",
            StateEvent::RateLimitRecovered => "rate_limit_recovered",
            StateEvent::CheckOrder => "check_order",
            StateEvent::OrderReady => "order_ready",
            StateEvent::Preprocess => "preprocess",
            StateEvent::PreprocessComplete => "preprocess_complete",
            StateEvent::Sent => "sent",
            StateEvent::PartialConfirm => "partial_confirm",
            StateEvent::Confirm => "confirm",
            StateEvent::Fail => "fail",
            StateEvent::Timeout => "timeout",
            StateEvent::Cancel => "cancel",
            StateEvent::Expire => "expire",
            StateEvent::PauseSend => "pause_send",
            StateEvent::ResumeSend => "resume_send",
            StateEvent::MaxRetriesExceeded => "max_retries_exceeded",
            StateEvent::PrepareRetry => "prepare_retry",
            StateEvent::Retry => "retry",
            StateEvent::DelayRetry => "delay_retry",
            StateEvent::RetryResume => "retry_resume",
            StateEvent::Archive => "archive",
            StateEvent::ArchiveComplete => "archive_complete",
            StateEvent::Reset => "reset",
        }
    }
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

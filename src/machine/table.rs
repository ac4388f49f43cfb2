//! # The static transition table.
//!
//! Two pure functions over configuration-invariant data:
//!
//! - [`allowed_events`] the set of events legal in a state
//! - [`next_state`] the successor for a legal (state, event) pair
//!
//! The table is exhaustive: any pair not listed here is implicitly rejected
//! by the machine, with no mutation of the message.
//!
//! ## Rules
//! - The only guard that mutates is `PrepareRetry`: when the retry budget
//!   admits it, the retry counter is incremented before the successor is
//!   returned; when the budget is exhausted the successor is the dead letter.
//! - `CheckOrder` from `Queued` resolves against the ordering flag: disabled
//!   pipelines skip straight to preprocessing.
//! - The `Check*` events are listed for their home states so the scheduler
//!   can fire them, but they never reach [`next_state`]: pre-transition work
//!   substitutes the effective outcome event first.

use crate::machine::StateEvent;
use crate::message::{Message, MsgState};

/// Events legal in the given state.
///
/// Terminal states accept only archiving (plus reset out of the dead letter);
/// `Archived` accepts nothing.
pub fn allowed_events(state: MsgState) -> &'static [StateEvent] {
    use MsgState as S;
    use StateEvent as E;

    match state {
        S::Init => &[E::StartProcessing, E::Cancel, E::Expire],
        S::DedupChecking => &[
            E::CheckDedup,
            E::DedupPass,
            E::DedupDuplicate,
            E::Timeout,
            E::Cancel,
        ],
        S::RateLimiting => &[
            E::CheckRateLimit,
            E::RateLimitPass,
            E::RateLimitExceeded,
            E::Timeout,
            E::Cancel,
        ],
        S::RateLimited => &[E::RateLimitRecovered, E::Timeout, E::Cancel],
        S::Queued => &[
            E::CheckOrder,
            E::OrderReady,
            E::Preprocess,
            E::Timeout,
            E::Cancel,
        ],
        S::OrderingWait => &[E::OrderReady, E::Timeout, E::Cancel],
        S::Preprocessing => &[E::PreprocessComplete, E::Fail, E::Timeout, E::Cancel],
        S::Sending => &[E::Sent, E::Fail, E::PauseSend, E::Timeout, E::Cancel],
        S::SendPaused => &[E::ResumeSend, E::Timeout, E::Cancel],
        S::Sent => &[E::Confirm, E::PartialConfirm, E::Fail, E::Timeout, E::Cancel],
        S::PartialConfirmed => &[E::Confirm, E::PartialConfirm, E::Timeout, E::Cancel],
        S::Failed => &[E::PrepareRetry, E::MaxRetriesExceeded, E::Cancel],
        S::RetryPreparing => &[E::Retry, E::DelayRetry, E::MaxRetriesExceeded, E::Cancel],
        S::Retrying => &[E::Sent, E::Fail, E::Timeout, E::Cancel],
        S::RetryDelayed => &[E::RetryResume, E::MaxRetriesExceeded, E::Cancel],
        S::Timeout => &[E::PrepareRetry, E::MaxRetriesExceeded, E::Cancel],
        S::Confirmed | S::Duplicate | S::Expired | S::Cancelled => &[E::Archive],
        S::DeadLetter => &[E::Archive, E::Reset],
        S::Archiving => &[E::ArchiveComplete],
        S::Archived => &[],
    }
}

/// True when the event is legal in the state.
pub fn allows(state: MsgState, event: StateEvent) -> bool {
    allowed_events(state).contains(&event)
}

/// Computes the successor state for a legal (state, event) pair.
///
/// Returns `None` for pairs with no successor (including the `Check*`
/// placeholders). The `PrepareRetry` guard increments the message's retry
/// counter when admitted.
pub fn next_state(
    state: MsgState,
    event: StateEvent,
    message: &mut Message,
    ordering_enabled: bool,
) -> Option<MsgState> {
    use MsgState as S;
    use StateEvent as E;

    match (state, event) {
        (S::Init, E::StartProcessing) => Some(S::DedupChecking),
        (S::Init, E::Cancel) => Some(S::Cancelled),
        (S::Init, E::Expire) => Some(S::Expired),

        (S::DedupChecking, E::DedupPass) => Some(S::RateLimiting),
        (S::DedupChecking, E::DedupDuplicate) => Some(S::Duplicate),

        (S::RateLimiting, E::RateLimitPass) => Some(S::Queued),
        (S::RateLimiting, E::RateLimitExceeded) => Some(S::RateLimited),

        (S::RateLimited, E::RateLimitRecovered) => Some(S::Queued),

        (S::Queued, E::CheckOrder) => {
            if ordering_enabled {
                Some(S::OrderingWait)
            } else {
                Some(S::Preprocessing)
            }
        }
        (S::Queued, E::OrderReady) => Some(S::Preprocessing),
        (S::Queued, E::Preprocess) => Some(S::Preprocessing),

        (S::OrderingWait, E::OrderReady) => Some(S::Preprocessing),

        (S::Preprocessing, E::PreprocessComplete) => Some(S::Sending),
        (S::Preprocessing, E::Fail) => Some(S::Failed),

        (S::Sending, E::Sent) => Some(S::Sent),
        (S::Sending, E::Fail) => Some(S::Failed),
        (S::Sending, E::PauseSend) => Some(S::SendPaused),

        (S::SendPaused, E::ResumeSend) => Some(S::Sending),

        (S::Sent, E::Confirm) => Some(S::Confirmed),
        (S::Sent, E::PartialConfirm) => Some(S::PartialConfirmed),
        (S::Sent, E::Fail) => Some(S::Failed),

        (S::PartialConfirmed, E::Confirm) => Some(S::Confirmed),
        (S::PartialConfirmed, E::PartialConfirm) => Some(S::PartialConfirmed),

        (S::Failed | S::Timeout, E::PrepareRetry) => {
            if message.can_retry() {
                message.increment_retry();
                Some(S::RetryPreparing)
            } else {
                Some(S::DeadLetter)
            }
        }
        (S::Failed | S::Timeout, E::MaxRetriesExceeded) => Some(S::DeadLetter),

        (S::RetryPreparing, E::Retry) => Some(S::Retrying),
        (S::RetryPreparing, E::DelayRetry) => Some(S::RetryDelayed),
        (S::RetryPreparing, E::MaxRetriesExceeded) => Some(S::DeadLetter),

        (S::RetryDelayed, E::RetryResume) => Some(S::Retrying),
        (S::RetryDelayed, E::MaxRetriesExceeded) => Some(S::DeadLetter),

        (S::Retrying, E::Sent) => Some(S::Sent),
        (S::Retrying, E::Fail) => Some(S::Failed),

        // Any state where Timeout is legal lands in the timeout state.
        (_, E::Timeout) if allows(state, E::Timeout) => Some(S::Timeout),
        // Likewise cancellation.
        (_, E::Cancel) if allows(state, E::Cancel) => Some(S::Cancelled),

        (
            S::Confirmed | S::Duplicate | S::DeadLetter | S::Expired | S::Cancelled,
            E::Archive,
        ) => Some(S::Archiving),
        (S::DeadLetter, E::Reset) => Some(S::Init),

        (S::Archiving, E::ArchiveComplete) => Some(S::Archived),

        _ => None,
    }
}

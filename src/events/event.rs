//! # Transition events broadcast by the engine.
//!
//! Every committed state transition is published as a [`TransitionEvent`].
//! Events carry a globally unique sequence number (`seq`) that increases
//! monotonically, so observers can order them correctly even when delivered
//! out of order through async channels.
//!
//! ## Example
//! ```
//! use fluxq::{MsgState, StateEvent, TransitionEvent};
//!
//! let ev = TransitionEvent::now("m-1", MsgState::Sending, MsgState::Failed, StateEvent::Fail)
//!     .with_error("transport rejected: boom");
//!
//! assert_eq!(ev.to, MsgState::Failed);
//! assert_eq!(ev.error.as_deref(), Some("transport rejected: boom"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::machine::StateEvent;
use crate::message::MsgState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// A committed state transition, as seen on the bus.
#[derive(Clone, Debug)]
pub struct TransitionEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for logging only).
    pub at: SystemTime,
    /// Identifier of the message that transitioned.
    pub message_id: String,
    /// State before the transition.
    pub from: MsgState,
    /// State after the transition.
    pub to: MsgState,
    /// Stimulus that drove the transition.
    pub event: StateEvent,
    /// Error detail, when the transition was driven by a failure.
    pub error: Option<String>,
}

impl TransitionEvent {
    /// Creates an event with the current timestamp and next sequence number.
    pub fn now(
        message_id: impl Into<String>,
        from: MsgState,
        to: MsgState,
        event: StateEvent,
    ) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            message_id: message_id.into(),
            from,
            to,
            event,
            error: None,
        }
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// True when the transition landed in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.to.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = TransitionEvent::now("m", MsgState::Init, MsgState::DedupChecking, StateEvent::StartProcessing);
        let b = TransitionEvent::now("m", MsgState::DedupChecking, MsgState::RateLimiting, StateEvent::DedupPass);
        assert!(b.seq > a.seq);
    }
}

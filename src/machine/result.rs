//! # Transition outcomes.
//!
//! [`TransitionResult`] is what [`StateMachine::fire`](crate::StateMachine::fire)
//! returns for every stimulus:
//!
//! - `success` — the transition committed; `from`/`to` describe the move
//! - `invalid` — the table rejected the pair; the message is untouched
//! - `error` — pre- or post-transition work failed; the message is untouched
//!
//! No panic or error ever escapes `fire`; everything maps onto one of these.

use std::time::SystemTime;

use crate::machine::StateEvent;
use crate::message::MsgState;

/// How a fired event was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The transition committed.
    Applied,
    /// Rejected by the transition table; no mutation.
    Rejected,
    /// Pre- or post-transition work failed; no mutation.
    Faulted,
}

/// Result of firing one event at a state machine.
#[derive(Debug, Clone)]
pub struct TransitionResult {
    outcome: Outcome,
    from: MsgState,
    to: MsgState,
    event: StateEvent,
    error: Option<String>,
}

impl TransitionResult {
    /// The transition committed.
    pub fn success(from: MsgState, to: MsgState, event: StateEvent) -> Self {
        Self {
            outcome: Outcome::Applied,
            from,
            to,
            event,
            error: None,
        }
    }

    /// The table rejected the (state, event) pair.
    pub fn invalid(current: MsgState, event: StateEvent, reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Rejected,
            from: current,
            to: current,
            event,
            error: Some(reason.into()),
        }
    }

    /// Pre- or post-transition work failed.
    pub fn error(current: MsgState, event: StateEvent, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Faulted,
            from: current,
            to: current,
            event,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Applied
    }

    /// True when the table rejected the pair.
    pub fn is_invalid(&self) -> bool {
        self.outcome == Outcome::Rejected
    }

    /// True when pre/post work threw.
    pub fn is_error(&self) -> bool {
        self.outcome == Outcome::Faulted
    }

    pub fn from_state(&self) -> MsgState {
        self.from
    }

    pub fn to_state(&self) -> MsgState {
        self.to
    }

    pub fn event(&self) -> StateEvent {
        self.event
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl std::fmt::Display for TransitionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.outcome {
            Outcome::Applied => write!(f, "{} -> {} via {}", self.from, self.to, self.event),
            _ => write!(
                f,
                "rejected {} at {}: {}",
                self.event,
                self.from,
                self.error.as_deref().unwrap_or("unspecified")
            ),
        }
    }
}

/// Optional caller-supplied context attached to a fired event.
///
/// Carried through to listeners unchanged; the engine itself only reads it
/// for logging.
#[derive(Debug, Clone)]
pub struct TransitionContext {
    /// Identifier of the message the event was fired at.
    pub message_id: String,
    /// Free-form note (failure reason, operator tag).
    pub note: Option<String>,
    /// When the context was created.
    pub at: SystemTime,
}

impl TransitionContext {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            note: None,
            at: SystemTime::now(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

//! # Per-machine transition listener.
//!
//! [`StateListener`] is the synchronous observation point on a single state
//! machine: it sees every committed transition of that machine, in order.
//!
//! ## Rules
//! - Called under the machine's transition lock: implementations must be
//!   brief and must not block.
//! - Must never call `fire` on their own machine; schedule deferred work
//!   instead.
//! - Panics are caught by the machine, logged, and never affect the
//!   transition or the other listeners.
//!
//! For asynchronous observation across all machines, subscribe to the bus
//! via [`MessageProcessor::subscribe`](crate::MessageProcessor::subscribe).

use crate::machine::{StateEvent, TransitionContext};
use crate::message::{Message, MsgState};

/// Observer of committed transitions on one state machine.
pub trait StateListener: Send + Sync + 'static {
    /// Invoked after each commit, before post-transition work is scheduled.
    fn on_transition(
        &self,
        message: &Message,
        from: MsgState,
        to: MsgState,
        event: StateEvent,
        context: Option<&TransitionContext>,
    );
}

/// Closures are listeners.
impl<F> StateListener for F
where
    F: Fn(&Message, MsgState, MsgState, StateEvent, Option<&TransitionContext>)
        + Send
        + Sync
        + 'static,
{
    fn on_transition(
        &self,
        message: &Message,
        from: MsgState,
        to: MsgState,
        event: StateEvent,
        context: Option<&TransitionContext>,
    ) {
        self(message, from, to, event, context)
    }
}

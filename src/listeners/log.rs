//! # LogListener — simple transition printer.
//!
//! A minimal listener that prints every transition to stdout.
//! Use it for tests or demos.
//!
//! ## Example output
//! ```text
//! [transition] id=m-1 init -> dedup_checking via start_processing
//! [transition] id=m-1 sending -> failed via fail (transport rejected: boom)
//! ```

use crate::listeners::StateListener;
use crate::machine::{StateEvent, TransitionContext};
use crate::message::{Message, MsgState};

/// Transition printer.
pub struct LogListener;

impl StateListener for LogListener {
    fn on_transition(
        &self,
        message: &Message,
        from: MsgState,
        to: MsgState,
        event: StateEvent,
        context: Option<&TransitionContext>,
    ) {
        match context.and_then(|c| c.note.as_deref()) {
            Some(note) => {
                println!("[transition] id={} {from} -> {to} via {event} ({note})", message.id());
            }
            None => {
                println!("[transition] id={} {from} -> {to} via {event}", message.id());
            }
        }
    }
}

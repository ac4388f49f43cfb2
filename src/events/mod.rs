//! Transition events: data model and broadcast bus.
//!
//! - [`TransitionEvent`] one committed transition with ordering metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! Publishers: every [`StateMachine`](crate::StateMachine) after commit.
//! Consumers: the processor's stats listener, plus anything handed a receiver
//! via [`MessageProcessor::subscribe`](crate::MessageProcessor::subscribe).

mod bus;
mod event;

pub use bus::Bus;
pub use event::TransitionEvent;

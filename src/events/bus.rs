//! # Event bus for broadcasting transitions.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] through which
//! state machines publish [`TransitionEvent`]s to any number of observers.
//!
//! - **Broadcast semantics**: every active subscriber receives a clone of each event
//! - **Non-persistent**: events published with no subscribers are dropped silently
//! - **Bounded capacity**: the oldest unread events are dropped when a receiver lags

use tokio::sync::broadcast;

use super::event::TransitionEvent;

/// Broadcast channel for transition events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<TransitionEvent>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// Dropped silently when nobody is subscribed; the engine operates fine
    /// without observers.
    pub fn publish(&self, ev: TransitionEvent) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new subscriber that receives all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.tx.subscribe()
    }
}

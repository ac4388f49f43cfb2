//! Per-message state machine: events, table, results, driver.
//!
//! ## Files & responsibilities
//! - **event.rs**: [`StateEvent`] — the stimuli that may advance a message.
//! - **table.rs**: the static transition table; pure data plus the one
//!   retry-budget guard.
//! - **result.rs**: [`TransitionResult`] and [`TransitionContext`] — every
//!   `fire` resolves to one of success / invalid / error.
//! - **core.rs**: [`StateMachine`] — owns one message, serializes its
//!   transitions, consults the admission components, notifies listeners and
//!   schedules the next step.
//!
//! ## Pipeline (happy path)
//! ```text
//! Init ─► DedupChecking ─► RateLimiting ─► Queued ─► [OrderingWait] ─►
//!   Preprocessing ─► Sending ─► Sent ─► Confirmed
//! ```
//!
//! Failures route through `Failed → RetryPreparing → RetryDelayed → Retrying`
//! until the retry budget runs out and the message settles in the dead
//! letter. Timeouts re-enter the same loop. Terminal states accept only
//! archiving, plus a reset out of the dead letter.

mod core;
mod event;
mod result;
pub mod table;

pub use self::core::{MachineParams, StateMachine};
pub use event::StateEvent;
pub use result::{TransitionContext, TransitionResult};

//! # Transport seam.
//!
//! The engine never talks to a wire itself. On entering the dispatch states
//! it hands the message to a [`Transport`] and turns the outcome into the
//! matching stimulus:
//!
//! ```text
//! Sending   ──► transport.send()    ──► Ok        → SENT
//!                                   ──► Err       → FAIL
//! Sent      ──► transport.confirm() ──► Full      → CONFIRM
//!                                   ──► Partial   → PARTIAL_CONFIRM
//!                                   ──► Err       → FAIL
//! ```
//!
//! [`LoopbackTransport`] is the in-process reference implementation: it
//! confirms everything after a short pacing delay, and fails messages that
//! carry the `simulateFailure` tag. Production deployments plug a broker
//! client in here.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use crate::error::TransportError;
use crate::message::Message;

/// Tag honoured by the loopback transport: `"true"` makes every send fail.
pub const TAG_SIMULATE_FAILURE: &str = "simulateFailure";

/// How a confirmation round resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Every consumer confirmed.
    Full,
    /// A subset confirmed (multicast); another round will follow.
    Partial,
}

/// Wire-side collaborator for dispatch and confirmation.
///
/// Implementations must be non-blocking and safe to call for many messages
/// concurrently. Errors are mapped to FAIL on the owning message, so a
/// transport never needs to retry internally.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Performs the dispatch. Resolving `Ok` means the broker accepted the
    /// message.
    async fn send(&self, message: &Message) -> Result<(), TransportError>;

    /// Awaits confirmation for a message the broker accepted.
    async fn confirm(&self, message: &Message) -> Result<Confirmation, TransportError>;
}

/// In-process reference transport.
///
/// Accepts everything after `pacing`, except messages tagged
/// `simulateFailure=true`, which are rejected on every attempt.
pub struct LoopbackTransport {
    pacing: Duration,
}

impl LoopbackTransport {
    pub fn new(pacing: Duration) -> Self {
        Self { pacing }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        time::sleep(self.pacing).await;
        if message.tag(TAG_SIMULATE_FAILURE) == Some("true") {
            return Err(TransportError::Rejected {
                reason: "simulated failure".to_string(),
            });
        }
        Ok(())
    }

    async fn confirm(&self, _message: &Message) -> Result<Confirmation, TransportError> {
        time::sleep(self.pacing).await;
        Ok(Confirmation::Full)
    }
}

//! # Error types used by the engine and its transport seam.
//!
//! Two enums:
//!
//! - [`EngineError`] errors raised by the processing runtime itself.
//! - [`TransportError`] errors raised by the wire transport collaborator.
//!
//! Both provide `as_label` for metrics; [`TransportError`] additionally has
//! `is_retryable()`.
//!
//! Rejected transitions are not errors: they surface as an unsuccessful
//! [`TransitionResult`](crate::TransitionResult) and leave the message
//! untouched.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the processing runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EngineError {
    /// Shutdown grace period was exceeded; outstanding scheduled work was
    /// cancelled.
    #[error("shutdown grace {grace:?} exceeded; cancelled outstanding work")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
    },

    /// An operation referenced a message the processor no longer tracks.
    #[error("message '{id}' not found in registry")]
    MessageNotFound {
        /// The missing message identifier.
        id: String,
    },
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::GraceExceeded { .. } => "engine_grace_exceeded",
            EngineError::MessageNotFound { .. } => "engine_message_not_found",
        }
    }
}

/// Errors produced by the transport collaborator.
///
/// The engine maps any of these to a FAIL stimulus on the owning message;
/// whether the failure re-enters the retry loop is decided by the retry
/// budget, not by the error variant.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The broker refused the message.
    #[error("transport rejected: {reason}")]
    Rejected { reason: String },

    /// The broker could not be reached.
    #[error("transport unavailable: {reason}")]
    Unavailable { reason: String },

    /// Confirmation did not arrive in time.
    #[error("confirmation timed out after {timeout:?}")]
    ConfirmTimeout { timeout: Duration },
}

impl TransportError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Rejected { .. } => "transport_rejected",
            TransportError::Unavailable { .. } => "transport_unavailable",
            TransportError::ConfirmTimeout { .. } => "transport_confirm_timeout",
        }
    }

    /// Indicates whether a retry of the same message could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Unavailable { .. } | TransportError::ConfirmTimeout { .. }
        )
    }
}

//! # Outcomes surfaced to submitters.
//!
//! A [`ProcessingResult`] is produced when a submitted message reaches a
//! terminal state, or when the submitter's own deadline runs out first.
//! [`BatchResult`] aggregates the per-message results of a batch submission.

use std::time::SystemTime;

use crate::message::MsgState;

/// How a submission resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    /// Confirmed end to end.
    Success,
    /// Settled without success (dead letter, expired, cancelled).
    Failed,
    /// The engine itself misbehaved (unknown terminal, submitter deadline).
    Error,
    /// Dropped as a duplicate.
    Duplicate,
    /// Rejected by the limiter (informational, not a settlement).
    RateLimited,
}

/// Per-message outcome record.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    message_id: String,
    status: ProcessingStatus,
    detail: String,
    at: SystemTime,
}

impl ProcessingResult {
    fn new(message_id: impl Into<String>, status: ProcessingStatus, detail: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status,
            detail: detail.into(),
            at: SystemTime::now(),
        }
    }

    pub fn success(message_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(message_id, ProcessingStatus::Success, detail)
    }

    pub fn failed(message_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(message_id, ProcessingStatus::Failed, detail)
    }

    pub fn error(message_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(message_id, ProcessingStatus::Error, detail)
    }

    pub fn duplicate(message_id: impl Into<String>) -> Self {
        Self::new(
            message_id,
            ProcessingStatus::Duplicate,
            "Duplicate message detected",
        )
    }

    pub fn rate_limited(message_id: impl Into<String>) -> Self {
        Self::new(message_id, ProcessingStatus::RateLimited, "Message rate limited")
    }

    /// Maps a terminal state onto the outcome the submitter sees.
    pub fn from_terminal_state(message_id: impl Into<String>, state: MsgState) -> Self {
        match state {
            MsgState::Confirmed => Self::success(message_id, "Message processed successfully"),
            MsgState::Duplicate => Self::duplicate(message_id),
            MsgState::DeadLetter => {
                Self::failed(message_id, "Message moved to dead letter queue")
            }
            MsgState::Expired => Self::failed(message_id, "Message expired"),
            MsgState::Cancelled => Self::failed(message_id, "Message cancelled"),
            MsgState::Timeout => Self::failed(message_id, "Processing timeout"),
            other => Self::error(message_id, format!("Unknown terminal state: {other}")),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn at(&self) -> SystemTime {
        self.at
    }

    pub fn is_success(&self) -> bool {
        self.status == ProcessingStatus::Success
    }

    /// Failed or errored; duplicates and rate limits are neither.
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ProcessingStatus::Failed | ProcessingStatus::Error)
    }
}

impl std::fmt::Display for ProcessingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {:?} ({})",
            self.message_id, self.status, self.detail
        )
    }
}

/// Aggregated outcome of a batch submission.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    results: Vec<ProcessingResult>,
}

impl BatchResult {
    pub fn new(results: Vec<ProcessingResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[ProcessingResult] {
        &self.results
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.succeeded() as f64 / self.total() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_state_mapping() {
        let r = ProcessingResult::from_terminal_state("m", MsgState::Confirmed);
        assert!(r.is_success());
        let r = ProcessingResult::from_terminal_state("m", MsgState::Duplicate);
        assert_eq!(r.status(), ProcessingStatus::Duplicate);
        assert!(!r.is_failed());
        let r = ProcessingResult::from_terminal_state("m", MsgState::Cancelled);
        assert!(r.is_failed());
        assert_eq!(r.detail(), "Message cancelled");
        let r = ProcessingResult::from_terminal_state("m", MsgState::Sending);
        assert_eq!(r.status(), ProcessingStatus::Error);
    }

    #[test]
    fn batch_accounting() {
        let batch = BatchResult::new(vec![
            ProcessingResult::success("a", "ok"),
            ProcessingResult::failed("b", "dead letter"),
            ProcessingResult::duplicate("c"),
            ProcessingResult::success("d", "ok"),
        ]);
        assert_eq!(batch.total(), 4);
        assert_eq!(batch.succeeded(), 2);
        assert_eq!(batch.failed(), 1);
        assert_eq!(batch.success_rate(), 0.5);
    }
}

//! Submitter-facing surface: the processor facade and its outcome records.
//!
//! - [`MessageProcessor`] submit/cancel/retry/archive plus stats and the
//!   transition bus
//! - [`ProcessingResult`], [`BatchResult`] per-message and batch outcomes
//! - [`ProcessorStats`] throughput counters

mod core;
mod result;
mod stats;

pub use self::core::MessageProcessor;
pub use result::{BatchResult, ProcessingResult, ProcessingStatus};
pub use stats::ProcessorStats;

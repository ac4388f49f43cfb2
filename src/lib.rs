//! # fluxq
//!
//! **Fluxq** is a lightweight in-process message pipeline engine.
//!
//! Every submitted message is driven through a guarded state machine that
//! covers admission (deduplication, rate limiting, ordered release),
//! transport (send, confirm) and failure handling (timeouts, retry backoff,
//! dead letter). The crate is designed as the core of a broker or worker
//! system; the wire transport plugs in at a single seam.
//!
//! ## Features
//!
//! | Area            | Description                                                   | Key types / traits                           |
//! |-----------------|---------------------------------------------------------------|----------------------------------------------|
//! | **Processing**  | Submit messages and await their settlement.                   | [`MessageProcessor`], [`ProcessingResult`]   |
//! | **State machine** | Guarded transitions over a static table.                    | [`StateMachine`], [`StateEvent`], [`MsgState`] |
//! | **Admission**   | Dedup window, token bucket, per-partition ordering.           | [`Deduplicator`], [`RateLimiter`], [`OrderingCoordinator`] |
//! | **Transport**   | Wire seam with an in-process reference implementation.        | [`Transport`], [`LoopbackTransport`]         |
//! | **Observation** | Per-machine listeners and a broadcast transition bus.         | [`StateListener`], [`TransitionEvent`]       |
//! | **Configuration** | Centralized, immutable runtime settings.                    | [`Config`]                                   |
//!
//! ```no_run
//! use fluxq::{Config, Message, MessageProcessor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut cfg = Config::default();
//!     cfg.retry.max_retries = 2;
//!
//!     let processor = MessageProcessor::new(cfg);
//!
//!     let result = processor
//!         .submit(Message::new("ORDER", "order #42 created").with_priority(8))
//!         .await;
//!     assert!(result.is_success());
//!
//!     processor.shutdown().await.ok();
//! }
//! ```
//!
//! ---

pub mod admission;
mod config;
mod error;
mod events;
mod listeners;
pub mod machine;
mod message;
mod processor;
mod scheduler;
mod transport;

// ---- Public re-exports ----

pub use admission::{
    DedupDecision, DedupStats, Deduplicator, LatePolicy, OrderDecision, OrderingCoordinator,
    OrderingStats, RateLimitStats, RateLimiter,
};
pub use config::{
    Config, DedupConfig, EngineConfig, OrderingConfig, RateLimitConfig, RetryConfig,
    TimeoutConfig,
};
pub use error::{EngineError, TransportError};
pub use events::{Bus, TransitionEvent};
pub use listeners::{LogListener, StateListener};
pub use machine::{
    MachineParams, StateEvent, StateMachine, TransitionContext, TransitionResult,
};
pub use message::{Message, MsgState, TAG_PARTITION_KEY, TAG_SEQUENCE};
pub use processor::{
    BatchResult, MessageProcessor, ProcessingResult, ProcessingStatus, ProcessorStats,
};
pub use scheduler::Scheduler;
pub use transport::{Confirmation, LoopbackTransport, Transport, TAG_SIMULATE_FAILURE};

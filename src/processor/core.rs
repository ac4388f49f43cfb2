//! # MessageProcessor: the submitter-facing facade.
//!
//! Owns the runtime: the admission components, the transport seam, the
//! transition bus, the shared scheduler and the registry of live state
//! machines. One processor supervises any number of concurrent messages.
//!
//! ## Architecture
//! ```text
//! submit(msg) ──► register StateMachine ──► start() ──► poll until terminal
//!                       │
//!                       ├──► machine publishes every transition to Bus
//!                       │
//!                       └──► stats_listener()
//!                             ├──► success / failure counters
//!                             └──► drops machines that reach Archived
//! ```
//!
//! ## Rules
//! - Admission state (dedup cache, token bucket, partitions) is shared by
//!   all machines and lives exactly as long as the processor.
//! - A machine stays registered after settling so the caller can archive,
//!   retry or redrive it; archiving is what removes it.
//! - Shutdown drains scheduled work within the grace window, then cancels
//!   the stragglers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, info};

use crate::admission::{
    DedupStats, Deduplicator, OrderingCoordinator, OrderingStats, RateLimitStats, RateLimiter,
    SWEEP_INTERVAL_MS,
};
use crate::config::Config;
use crate::error::EngineError;
use crate::events::{Bus, TransitionEvent};
use crate::machine::{MachineParams, StateEvent, StateMachine, TransitionResult};
use crate::message::{Message, MsgState};
use crate::processor::result::{BatchResult, ProcessingResult};
use crate::processor::stats::ProcessorStats;
use crate::scheduler::Scheduler;
use crate::transport::{LoopbackTransport, Transport};

/// Capacity of the transition bus.
const BUS_CAPACITY: usize = 1024;

/// Submitter-facing engine facade.
pub struct MessageProcessor {
    config: Arc<Config>,
    dedup: Arc<Deduplicator>,
    limiter: Arc<RateLimiter>,
    ordering: Arc<OrderingCoordinator>,
    transport: Arc<dyn Transport>,
    bus: Bus,
    scheduler: Scheduler,
    machines: Arc<DashMap<String, StateMachine>>,
    succeeded: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl MessageProcessor {
    /// Creates a processor wired to the in-process loopback transport.
    pub fn new(config: Config) -> Self {
        let pacing = config.engine.pacing;
        Self::with_transport(config, Arc::new(LoopbackTransport::new(pacing)))
    }

    /// Creates a processor with a caller-supplied transport.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let config = Arc::new(config);
        let processor = Self {
            dedup: Arc::new(Deduplicator::new(config.dedup.clone())),
            limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            ordering: Arc::new(OrderingCoordinator::new(config.ordering.clone())),
            transport,
            bus: Bus::new(BUS_CAPACITY),
            scheduler: Scheduler::new(),
            machines: Arc::new(DashMap::new()),
            succeeded: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            config,
        };
        processor.spawn_stats_listener();
        processor.spawn_dedup_sweeper();
        processor
    }

    /// Submits one message and resolves when it settles, or when the
    /// submitter deadline runs out.
    pub async fn submit(&self, mut message: Message) -> ProcessingResult {
        message.apply_default_retries(self.config.retry.max_retries);
        let id = message.id().to_string();

        debug!(id = %id, topic = message.topic(), "submitting message");
        let machine = StateMachine::new(message, self.machine_params());
        // A resubmission under the same identifier replaces the registry
        // entry; the dedup window decides whether it may proceed.
        self.machines.insert(id.clone(), machine.clone());

        machine.start();
        self.await_settlement(&machine).await
    }

    /// Submits a batch and aggregates the per-message outcomes.
    pub async fn submit_batch(&self, messages: Vec<Message>) -> BatchResult {
        let results =
            futures::future::join_all(messages.into_iter().map(|m| self.submit(m))).await;
        BatchResult::new(results)
    }

    /// Fires RETRY at a message sitting in retry preparation.
    pub async fn retry(&self, message_id: &str) -> ProcessingResult {
        self.fire_api(message_id, StateEvent::Retry, "Retry initiated")
    }

    /// Cancels a message from any non-terminal state.
    pub fn cancel(&self, message_id: &str) -> ProcessingResult {
        self.fire_api(message_id, StateEvent::Cancel, "Message cancelled")
    }

    /// Pauses an in-flight dispatch.
    pub fn pause(&self, message_id: &str) -> ProcessingResult {
        self.fire_api(message_id, StateEvent::PauseSend, "Send paused")
    }

    /// Resumes a paused dispatch.
    pub fn resume_send(&self, message_id: &str) -> ProcessingResult {
        self.fire_api(message_id, StateEvent::ResumeSend, "Send resumed")
    }

    /// Starts archiving a settled message. The registry entry goes away once
    /// the machine reaches `Archived`.
    pub fn archive(&self, message_id: &str) -> ProcessingResult {
        self.fire_api(message_id, StateEvent::Archive, "Archiving started")
    }

    /// Pulls a dead-lettered message back to `Init` and reruns admission.
    pub fn redrive(&self, message_id: &str) -> ProcessingResult {
        self.fire_api(message_id, StateEvent::Reset, "Message reset")
    }

    /// Current state of a registered message.
    pub fn state_of(&self, message_id: &str) -> Option<MsgState> {
        self.machines.get(message_id).map(|m| m.current_state())
    }

    /// Machine handle for a registered message, e.g. to attach listeners.
    pub fn machine(&self, message_id: &str) -> Option<StateMachine> {
        self.machines.get(message_id).map(|m| m.value().clone())
    }

    /// Receiver of every transition committed by any machine.
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.bus.subscribe()
    }

    /// Throughput counters.
    pub fn stats(&self) -> ProcessorStats {
        let active = self
            .machines
            .iter()
            .filter(|m| !m.current_state().is_terminal())
            .count();
        ProcessorStats {
            active,
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Dedup cache occupancy.
    pub fn dedup_stats(&self) -> DedupStats {
        self.dedup.stats()
    }

    /// Token bucket occupancy.
    pub fn rate_limit_stats(&self) -> RateLimitStats {
        self.limiter.stats()
    }

    /// Ordering coordinator occupancy.
    pub fn ordering_stats(&self) -> OrderingStats {
        self.ordering.stats()
    }

    /// Drains scheduled work within the configured grace window, then
    /// cancels whatever is left and clears the registry.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        info!("processor shutting down");
        let outcome = self.scheduler.shutdown(self.config.engine.grace).await;
        self.machines.clear();
        outcome
    }

    // ---------------------------
    // Internals
    // ---------------------------

    fn machine_params(&self) -> MachineParams {
        MachineParams {
            config: Arc::clone(&self.config),
            dedup: Arc::clone(&self.dedup),
            limiter: Arc::clone(&self.limiter),
            ordering: Arc::clone(&self.ordering),
            transport: Arc::clone(&self.transport),
            bus: self.bus.clone(),
            scheduler: self.scheduler.clone(),
        }
    }

    /// Polls the machine until it settles or the submitter deadline passes.
    async fn await_settlement(&self, machine: &StateMachine) -> ProcessingResult {
        let deadline = time::Instant::now() + self.config.engine.submit_deadline;
        let mut tick = time::interval(self.config.engine.poll_interval);
        tick.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            let state = machine.current_state();
            if state.is_terminal() {
                return ProcessingResult::from_terminal_state(machine.message_id(), state);
            }
            if time::Instant::now() >= deadline {
                return ProcessingResult::error(machine.message_id(), "Processing timeout");
            }
        }
    }

    /// Fires one externally driven event and reports the outcome.
    fn fire_api(
        &self,
        message_id: &str,
        event: StateEvent,
        ok_detail: &str,
    ) -> ProcessingResult {
        let Some(machine) = self.machine(message_id) else {
            return ProcessingResult::failed(message_id, "Message not found");
        };
        let result: TransitionResult = machine.fire(event);
        if result.is_success() {
            ProcessingResult::success(message_id, ok_detail)
        } else {
            ProcessingResult::failed(
                message_id,
                result.error_message().unwrap_or("transition rejected"),
            )
        }
    }

    /// Consumes the bus: keeps the counters and drops archived machines.
    fn spawn_stats_listener(&self) {
        let mut rx = self.bus.subscribe();
        let machines = Arc::clone(&self.machines);
        let succeeded = Arc::clone(&self.succeeded);
        let failed = Arc::clone(&self.failed);

        self.scheduler.spawn_detached(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => match ev.to {
                        MsgState::Confirmed => {
                            succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        MsgState::DeadLetter | MsgState::Expired | MsgState::Cancelled => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                        MsgState::Archived => {
                            machines.remove(&ev.message_id);
                        }
                        _ => {}
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
    }

    /// Periodic dedup cache eviction.
    fn spawn_dedup_sweeper(&self) {
        let dedup = Arc::clone(&self.dedup);
        self.scheduler.spawn_detached(async move {
            let mut tick =
                time::interval(std::time::Duration::from_millis(SWEEP_INTERVAL_MS));
            tick.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            tick.tick().await;
            loop {
                tick.tick().await;
                dedup.sweep();
            }
        });
    }
}

//! # StateMachine: per-message transition driver.
//!
//! One [`StateMachine`] owns one [`Message`] and everything that happens to
//! it: table-checked transitions, admission checks, listener notification and
//! the scheduling of whatever comes next (auto-advance, timeouts, backoff,
//! recovery ticks, transport dispatch).
//!
//! ## Fire algorithm
//! ```text
//! fire(event, ctx)                       [serialized per instance]
//!   1. table lookup (state, event)           absent → invalid
//!   2. pre-transition work                   Check* consults admission and
//!                                            substitutes the outcome event
//!   3. successor via next_state              none → invalid
//!   4. commit: message.state = successor
//!   5. notify listeners (panics caught), publish to bus
//!   6. post-transition work: arm timeout, schedule next step
//! ```
//!
//! ## Rules
//! - Steps 1–6 run under the instance lock; transitions on one message are
//!   totally ordered. Machines advance in parallel with each other.
//! - No error or panic escapes `fire`; everything maps to a
//!   [`TransitionResult`].
//! - Scheduled bodies re-read the state they were armed for and no-op on
//!   drift, so late timeouts and stale advances are harmless.
//! - Dispatch and confirmation go through the [`Transport`] seam; the machine
//!   never fabricates SENT or CONFIRM on its own.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::admission::{
    DedupDecision, Deduplicator, OrderDecision, OrderingCoordinator, RateLimiter,
};
use crate::config::Config;
use crate::events::{Bus, TransitionEvent};
use crate::listeners::StateListener;
use crate::machine::result::{TransitionContext, TransitionResult};
use crate::machine::{table, StateEvent};
use crate::message::{Message, MsgState};
use crate::scheduler::Scheduler;
use crate::transport::{Confirmation, Transport};

/// States that carry a deadline.
const TIMEOUT_STATES: [MsgState; 6] = [
    MsgState::DedupChecking,
    MsgState::RateLimiting,
    MsgState::Preprocessing,
    MsgState::Sending,
    MsgState::Sent,
    MsgState::OrderingWait,
];

/// Shared collaborators handed to every machine by its owner.
#[derive(Clone)]
pub struct MachineParams {
    /// Immutable engine configuration.
    pub config: Arc<Config>,
    /// Window-bounded uniqueness filter.
    pub dedup: Arc<Deduplicator>,
    /// Token bucket.
    pub limiter: Arc<RateLimiter>,
    /// Per-partition sequence gate.
    pub ordering: Arc<OrderingCoordinator>,
    /// Wire-side collaborator.
    pub transport: Arc<dyn Transport>,
    /// Broadcast bus for committed transitions.
    pub bus: Bus,
    /// Shared timer pool.
    pub scheduler: Scheduler,
}

/// Result of pre-transition work: the event to commit, plus the release
/// handle when the ordering gate parked the message.
struct PreWork {
    effective: StateEvent,
    release: Option<Arc<Notify>>,
}

impl PreWork {
    fn passthrough(event: StateEvent) -> Self {
        Self {
            effective: event,
            release: None,
        }
    }
}

struct Inner {
    id: String,
    message: Mutex<Message>,
    listeners: RwLock<Vec<Arc<dyn StateListener>>>,
    params: MachineParams,
    token: CancellationToken,
}

/// Drives one message through its lifecycle.
///
/// Cheap to clone; clones share the same instance.
#[derive(Clone)]
pub struct StateMachine {
    inner: Arc<Inner>,
}

impl StateMachine {
    /// Creates a machine for a freshly submitted message.
    pub fn new(message: Message, params: MachineParams) -> Self {
        let token = params.scheduler.token().child_token();
        Self {
            inner: Arc::new(Inner {
                id: message.id().to_string(),
                message: Mutex::new(message),
                listeners: RwLock::new(Vec::new()),
                params,
                token,
            }),
        }
    }

    /// Identifier of the owned message.
    pub fn message_id(&self) -> &str {
        &self.inner.id
    }

    /// Current state of the owned message.
    pub fn current_state(&self) -> MsgState {
        self.inner.message.lock().state()
    }

    /// Clone of the owned message.
    pub fn snapshot(&self) -> Message {
        self.inner.message.lock().clone()
    }

    /// True when the event is legal in the current state.
    pub fn can_fire(&self, event: StateEvent) -> bool {
        table::allows(self.current_state(), event)
    }

    /// Registers a transition listener.
    pub fn add_listener(&self, listener: Arc<dyn StateListener>) {
        self.inner.listeners.write().push(listener);
    }

    /// Kicks off admission. Expired messages go straight to `Expired`.
    pub fn start(&self) -> TransitionResult {
        if self.inner.message.lock().is_expired() {
            return self.fire(StateEvent::Expire);
        }
        self.fire(StateEvent::StartProcessing)
    }

    /// Fires an event without context.
    pub fn fire(&self, event: StateEvent) -> TransitionResult {
        self.fire_with(event, None)
    }

    /// Fires an event, carrying caller context through to listeners.
    pub fn fire_with(
        &self,
        event: StateEvent,
        context: Option<TransitionContext>,
    ) -> TransitionResult {
        let mut message = self.inner.message.lock();
        let current = message.state();

        if !table::allows(current, event) {
            debug!(id = %self.inner.id, state = %current, event = %event, "transition not allowed");
            return TransitionResult::invalid(current, event, "transition not allowed");
        }

        let pre = match self.pre_transition(event, &message) {
            Ok(pre) => pre,
            Err(reason) => {
                warn!(id = %self.inner.id, event = %event, reason, "pre-transition work failed");
                return TransitionResult::error(current, event, reason);
            }
        };

        let effective = pre.effective;
        if effective != event && !table::allows(current, effective) {
            return TransitionResult::invalid(current, effective, "substituted event not allowed");
        }

        let ordering_enabled = self.inner.params.config.ordering.enabled;
        let Some(next) = table::next_state(current, effective, &mut message, ordering_enabled)
        else {
            return TransitionResult::invalid(current, effective, "no successor state");
        };

        message.set_state(next);

        self.notify_listeners(&message, current, next, effective, context.as_ref());
        let mut bus_event = TransitionEvent::now(&self.inner.id, current, next, effective);
        if let Some(note) = context.as_ref().and_then(|c| c.note.clone()) {
            bus_event = bus_event.with_error(note);
        }
        self.inner.params.bus.publish(bus_event);

        debug!(id = %self.inner.id, from = %current, to = %next, event = %effective, "transition");

        self.post_transition(&message, next, pre.release);

        TransitionResult::success(current, next, effective)
    }

    /// Overwrites the state without consulting the table. Recovery use only;
    /// listeners are not notified and nothing is scheduled.
    pub fn force_state(&self, state: MsgState) {
        let mut message = self.inner.message.lock();
        let old = message.state();
        message.set_state(state);
        warn!(id = %self.inner.id, from = %old, to = %state, "forced state change");
    }

    /// Cancels this machine's scheduled work. The message keeps its state.
    pub fn shutdown(&self) {
        self.inner.token.cancel();
    }

    // ---------------------------
    // Pre-transition work
    // ---------------------------

    /// Resolves admission-check events into their outcome event. All other
    /// events pass through unchanged.
    fn pre_transition(&self, event: StateEvent, message: &Message) -> Result<PreWork, String> {
        match event {
            StateEvent::CheckDedup => {
                let effective = match self.inner.params.dedup.check(message) {
                    DedupDecision::Unique => StateEvent::DedupPass,
                    DedupDecision::Duplicate => StateEvent::DedupDuplicate,
                };
                Ok(PreWork::passthrough(effective))
            }
            StateEvent::CheckRateLimit => {
                let effective = if self.inner.params.limiter.try_acquire(1) {
                    StateEvent::RateLimitPass
                } else {
                    StateEvent::RateLimitExceeded
                };
                Ok(PreWork::passthrough(effective))
            }
            StateEvent::CheckOrder => {
                if !self.inner.params.config.ordering.enabled {
                    // The table routes straight to preprocessing.
                    return Ok(PreWork::passthrough(event));
                }
                match self.inner.params.ordering.admit(message) {
                    OrderDecision::Ready => Ok(PreWork::passthrough(StateEvent::OrderReady)),
                    OrderDecision::Parked(notify) => Ok(PreWork {
                        effective: event,
                        release: Some(notify),
                    }),
                    // Left to the ordering-wait deadline.
                    OrderDecision::Late => Ok(PreWork::passthrough(event)),
                }
            }
            _ => Ok(PreWork::passthrough(event)),
        }
    }

    // ---------------------------
    // Listener notification
    // ---------------------------

    /// Best-effort fan-out. A panicking listener is logged and skipped;
    /// the transition stands either way.
    fn notify_listeners(
        &self,
        message: &Message,
        from: MsgState,
        to: MsgState,
        event: StateEvent,
        context: Option<&TransitionContext>,
    ) {
        let listeners = self.inner.listeners.read().clone();
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener.on_transition(message, from, to, event, context)
            }));
            if outcome.is_err() {
                error!(id = %self.inner.id, from = %from, to = %to, "listener panicked");
            }
        }
    }

    // ---------------------------
    // Post-transition work
    // ---------------------------

    fn post_transition(&self, message: &Message, state: MsgState, release: Option<Arc<Notify>>) {
        let pacing = self.inner.params.config.engine.pacing;

        if TIMEOUT_STATES.contains(&state) {
            self.arm_timeout(state);
        }

        match state {
            // After a reset out of the dead letter the pipeline restarts.
            MsgState::Init => self.advance_after(pacing, state, StateEvent::StartProcessing),
            MsgState::DedupChecking => self.advance_after(pacing, state, StateEvent::CheckDedup),
            MsgState::RateLimiting => {
                self.advance_after(pacing, state, StateEvent::CheckRateLimit)
            }
            MsgState::RateLimited => self.spawn_recovery_ticker(),
            MsgState::Queued => self.advance_after(pacing, state, StateEvent::CheckOrder),
            MsgState::OrderingWait => {
                if let Some(notify) = release {
                    self.spawn_order_waiter(notify);
                }
                // Parked without a release handle: the deadline decides.
            }
            MsgState::Preprocessing => {
                self.advance_after(pacing, state, StateEvent::PreprocessComplete)
            }
            MsgState::Sending | MsgState::Retrying => self.spawn_dispatch(state),
            MsgState::Sent | MsgState::PartialConfirmed => self.spawn_confirm(state),
            MsgState::Failed | MsgState::Timeout => {
                self.advance_after(pacing, state, StateEvent::PrepareRetry)
            }
            MsgState::RetryPreparing => self.advance_after(pacing, state, StateEvent::DelayRetry),
            MsgState::RetryDelayed => {
                let delay = self
                    .inner
                    .params
                    .config
                    .retry
                    .delay_for(message.retry_count());
                self.advance_after(delay, state, StateEvent::RetryResume);
            }
            MsgState::Archiving => self.advance_after(pacing, state, StateEvent::ArchiveComplete),
            MsgState::Confirmed => {
                if self.inner.params.config.ordering.enabled {
                    self.inner.params.ordering.complete(message);
                }
            }
            _ => {}
        }
    }

    /// Schedules `event` after `delay`, skipped if the state moved on.
    fn advance_after(&self, delay: Duration, armed: MsgState, event: StateEvent) {
        let machine = self.clone();
        self.inner.params.scheduler.schedule(delay, move || {
            if machine.inner.token.is_cancelled() {
                return;
            }
            if machine.current_state() == armed {
                let _ = machine.fire(event);
            }
        });
    }

    /// Arms the per-state deadline. Deadlines are a detached safety net:
    /// they do not hold up a shutdown drain, and a state change makes them
    /// no-ops.
    fn arm_timeout(&self, armed: MsgState) {
        let timeout = self.inner.params.config.timeouts.for_state(armed);
        let machine = self.clone();
        self.inner.params.scheduler.spawn_detached(async move {
            time::sleep(timeout).await;
            if machine.inner.token.is_cancelled() {
                return;
            }
            if machine.current_state() == armed {
                let _ = machine.fire(StateEvent::Timeout);
            }
        });
    }

    /// Hands the message to the transport; the outcome becomes SENT or FAIL.
    ///
    /// The wait is bounded by the state deadline: once the armed state has
    /// timed out, the dispatch outcome is moot and the task ends.
    fn spawn_dispatch(&self, armed: MsgState) {
        let machine = self.clone();
        let transport = Arc::clone(&self.inner.params.transport);
        let bound = self.inner.params.config.timeouts.for_state(armed)
            + self.inner.params.config.engine.pacing;
        self.spawn_guarded(async move {
            let snapshot = machine.snapshot();
            if snapshot.state() != armed {
                return;
            }
            let Ok(outcome) = time::timeout(bound, transport.send(&snapshot)).await else {
                return;
            };
            match outcome {
                Ok(()) => {
                    if machine.current_state() == armed {
                        let _ = machine.fire(StateEvent::Sent);
                    }
                }
                Err(err) => {
                    if machine.current_state() == armed {
                        let ctx = TransitionContext::new(machine.message_id())
                            .with_note(err.to_string());
                        let _ = machine.fire_with(StateEvent::Fail, Some(ctx));
                    }
                }
            }
        });
    }

    /// Awaits confirmation; the outcome becomes CONFIRM, PARTIAL_CONFIRM or
    /// FAIL. Bounded like dispatch.
    fn spawn_confirm(&self, armed: MsgState) {
        let machine = self.clone();
        let transport = Arc::clone(&self.inner.params.transport);
        let bound = self.inner.params.config.timeouts.for_state(armed)
            + self.inner.params.config.engine.pacing;
        self.spawn_guarded(async move {
            let snapshot = machine.snapshot();
            if snapshot.state() != armed {
                return;
            }
            let Ok(outcome) = time::timeout(bound, transport.confirm(&snapshot)).await else {
                return;
            };
            match outcome {
                Ok(Confirmation::Full) => {
                    if machine.current_state() == armed {
                        let _ = machine.fire(StateEvent::Confirm);
                    }
                }
                Ok(Confirmation::Partial) => {
                    if machine.current_state() == armed {
                        let _ = machine.fire(StateEvent::PartialConfirm);
                    }
                }
                Err(err) => {
                    if machine.current_state() == armed {
                        let ctx = TransitionContext::new(machine.message_id())
                            .with_note(err.to_string());
                        let _ = machine.fire_with(StateEvent::Fail, Some(ctx));
                    }
                }
            }
        });
    }

    /// Recurring token re-check for a rate-limited message. The tick re-arms
    /// unconditionally; only a state change or an acquired token stops it.
    fn spawn_recovery_ticker(&self) {
        let machine = self.clone();
        let limiter = Arc::clone(&self.inner.params.limiter);
        let interval = self
            .inner
            .params
            .config
            .rate_limit
            .recovery_check_interval;
        self.spawn_guarded(async move {
            let mut tick = time::interval(interval);
            tick.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            tick.tick().await;
            loop {
                tick.tick().await;
                if machine.current_state() != MsgState::RateLimited {
                    return;
                }
                if limiter.try_acquire(1) {
                    let _ = machine.fire(StateEvent::RateLimitRecovered);
                    return;
                }
            }
        });
    }

    /// Waits for the ordering coordinator to release this message. The wait
    /// is bounded by the ordering-wait deadline; past it the timeout owns
    /// the message.
    fn spawn_order_waiter(&self, notify: Arc<Notify>) {
        let machine = self.clone();
        let bound = self
            .inner
            .params
            .config
            .timeouts
            .for_state(MsgState::OrderingWait)
            + self.inner.params.config.engine.pacing;
        self.spawn_guarded(async move {
            let Ok(()) = time::timeout(bound, notify.notified()).await else {
                return;
            };
            if machine.current_state() == MsgState::OrderingWait {
                let _ = machine.fire(StateEvent::OrderReady);
            }
        });
    }

    /// Spawns a future that also stops on this machine's shutdown.
    fn spawn_guarded<Fut>(&self, fut: Fut)
    where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let token = self.inner.token.clone();
        self.inner.params.scheduler.spawn(async move {
            tokio::select! {
                _ = fut => {}
                _ = token.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transport::LoopbackTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn params() -> MachineParams {
        let config = Arc::new(Config::default());
        MachineParams {
            dedup: Arc::new(Deduplicator::new(config.dedup.clone())),
            limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            ordering: Arc::new(OrderingCoordinator::new(config.ordering.clone())),
            transport: Arc::new(LoopbackTransport::new(Duration::from_millis(1))),
            bus: Bus::new(64),
            scheduler: Scheduler::new(),
            config,
        }
    }

    fn machine() -> StateMachine {
        StateMachine::new(Message::new("topic", "body"), params())
    }

    #[tokio::test]
    async fn unlisted_event_is_invalid_and_leaves_state_untouched() {
        let m = machine();
        let result = m.fire(StateEvent::Confirm);
        assert!(result.is_invalid());
        assert_eq!(result.from_state(), MsgState::Init);
        assert_eq!(result.to_state(), MsgState::Init);
        assert_eq!(m.current_state(), MsgState::Init);
    }

    #[tokio::test]
    async fn start_enters_dedup_checking() {
        let m = machine();
        let result = m.start();
        assert!(result.is_success());
        assert_eq!(result.to_state(), MsgState::DedupChecking);
        assert!(m.can_fire(StateEvent::Cancel));
        assert!(!m.can_fire(StateEvent::StartProcessing));
    }

    #[tokio::test]
    async fn expired_message_goes_straight_to_expired() {
        let msg = Message::new("t", "b").with_ttl(Duration::ZERO);
        let m = StateMachine::new(msg, params());
        tokio::time::sleep(Duration::from_millis(2)).await;
        let result = m.start();
        assert!(result.is_success());
        assert_eq!(m.current_state(), MsgState::Expired);
    }

    #[tokio::test]
    async fn terminal_states_reject_everything_but_archive() {
        let m = machine();
        m.force_state(MsgState::Confirmed);
        for event in [
            StateEvent::StartProcessing,
            StateEvent::Fail,
            StateEvent::Confirm,
            StateEvent::Cancel,
            StateEvent::Reset,
            StateEvent::Timeout,
        ] {
            assert!(m.fire(event).is_invalid(), "{event} should be rejected");
            assert_eq!(m.current_state(), MsgState::Confirmed);
        }
        assert!(m.fire(StateEvent::Archive).is_success());
        assert_eq!(m.current_state(), MsgState::Archiving);
    }

    #[tokio::test]
    async fn dead_letter_accepts_reset_back_to_init() {
        let m = machine();
        m.force_state(MsgState::DeadLetter);
        let result = m.fire(StateEvent::Reset);
        assert!(result.is_success());
        assert_eq!(m.current_state(), MsgState::Init);
    }

    #[tokio::test]
    async fn retry_counting_over_the_fail_loop() {
        let msg = Message::new("t", "b").with_max_retries(2);
        let m = StateMachine::new(msg, params());
        m.shutdown(); // keep scheduled work from advancing the machine

        for expected in 1..=2u32 {
            m.force_state(MsgState::Failed);
            let result = m.fire(StateEvent::PrepareRetry);
            assert!(result.is_success());
            assert_eq!(result.to_state(), MsgState::RetryPreparing);
            assert_eq!(m.snapshot().retry_count(), expected);
        }

        // Budget exhausted: the same stimulus now routes to the dead letter.
        m.force_state(MsgState::Failed);
        let result = m.fire(StateEvent::PrepareRetry);
        assert!(result.is_success());
        assert_eq!(result.to_state(), MsgState::DeadLetter);
        assert_eq!(m.snapshot().retry_count(), 2);
    }

    #[tokio::test]
    async fn check_dedup_substitutes_the_outcome_event() {
        let p = params();
        let first = StateMachine::new(Message::new("t", "b").with_id("same"), p.clone());
        first.shutdown();
        first.force_state(MsgState::DedupChecking);
        let result = first.fire(StateEvent::CheckDedup);
        assert!(result.is_success());
        assert_eq!(result.event(), StateEvent::DedupPass);
        assert_eq!(result.to_state(), MsgState::RateLimiting);

        let second = StateMachine::new(Message::new("t", "b").with_id("same"), p);
        second.shutdown();
        second.force_state(MsgState::DedupChecking);
        let result = second.fire(StateEvent::CheckDedup);
        assert_eq!(result.event(), StateEvent::DedupDuplicate);
        assert_eq!(second.current_state(), MsgState::Duplicate);
    }

    #[tokio::test]
    async fn a_panicking_listener_does_not_block_the_transition() {
        let m = machine();
        m.shutdown();
        let hits = Arc::new(AtomicUsize::new(0));

        struct Bomb;
        impl StateListener for Bomb {
            fn on_transition(
                &self,
                _: &Message,
                _: MsgState,
                _: MsgState,
                _: StateEvent,
                _: Option<&TransitionContext>,
            ) {
                panic!("listener boom");
            }
        }

        m.add_listener(Arc::new(Bomb));
        let h = Arc::clone(&hits);
        m.add_listener(Arc::new(
            move |_: &Message,
                  _: MsgState,
                  _: MsgState,
                  _: StateEvent,
                  _: Option<&TransitionContext>| {
                h.fetch_add(1, Ordering::SeqCst);
            },
        ));

        let result = m.fire(StateEvent::StartProcessing);
        assert!(result.is_success());
        assert_eq!(m.current_state(), MsgState::DedupChecking);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bus_sees_committed_transitions() {
        let p = params();
        let mut rx = p.bus.subscribe();
        let m = StateMachine::new(Message::new("t", "b"), p);
        m.shutdown();
        m.fire(StateEvent::StartProcessing);

        let ev = rx.try_recv().expect("transition should be on the bus");
        assert_eq!(ev.from, MsgState::Init);
        assert_eq!(ev.to, MsgState::DedupChecking);
        assert_eq!(ev.message_id, m.message_id());
    }
}

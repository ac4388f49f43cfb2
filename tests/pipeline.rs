//! End-to-end pipeline runs against the loopback transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fluxq::{
    Config, Confirmation, Message, MessageProcessor, MsgState, ProcessingStatus, StateEvent,
    Transport, TransportError, TAG_SIMULATE_FAILURE,
};

/// Default config with pacing tightened for tests.
fn quick_config() -> Config {
    let mut cfg = Config::default();
    cfg.engine.pacing = Duration::from_millis(20);
    cfg.engine.poll_interval = Duration::from_millis(10);
    cfg
}

#[tokio::test]
async fn plain_message_confirms_end_to_end() {
    let processor = MessageProcessor::new(quick_config());

    let message = Message::new("ORDER", "x").with_priority(5);
    let id = message.id().to_string();
    let result = processor.submit(message).await;

    assert!(result.is_success(), "unexpected outcome: {result}");
    assert_eq!(processor.state_of(&id), Some(MsgState::Confirmed));

    let stats = processor.stats();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.active, 0);

    processor.shutdown().await.unwrap();
}

#[tokio::test]
async fn identical_identifier_inside_window_is_deduplicated() {
    let mut cfg = quick_config();
    cfg.dedup.window = Duration::from_secs(30);
    let processor = MessageProcessor::new(cfg);

    let first = Message::new("ORDER", "x").with_id("DUP-1");
    let second = Message::new("ORDER", "x").with_id("DUP-1");

    let (a, b) = tokio::join!(processor.submit(first), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        processor.submit(second).await
    });

    let statuses = [a.status(), b.status()];
    assert!(
        statuses.contains(&ProcessingStatus::Success),
        "one submission should confirm: {a} / {b}"
    );
    assert!(
        statuses.contains(&ProcessingStatus::Duplicate),
        "one submission should be dropped as duplicate: {a} / {b}"
    );

    processor.shutdown().await.unwrap();
}

#[tokio::test]
async fn simulated_failures_exhaust_retries_into_the_dead_letter() {
    let mut cfg = quick_config();
    cfg.retry.base_delay = Duration::from_millis(500);
    cfg.retry.backoff_multiplier = 1.5;
    cfg.retry.max_delay = Duration::from_secs(5);
    cfg.retry.max_retries = 2;
    let processor = MessageProcessor::new(cfg);

    let mut events = processor.subscribe();

    let message = Message::new("ORDER", "doomed").with_tag(TAG_SIMULATE_FAILURE, "true");
    let id = message.id().to_string();
    let result = processor.submit(message).await;

    assert!(result.is_failed());
    assert_eq!(result.detail(), "Message moved to dead letter queue");
    assert_eq!(processor.state_of(&id), Some(MsgState::DeadLetter));

    let machine = processor.machine(&id).expect("machine stays registered");
    assert_eq!(machine.snapshot().retry_count(), 2);

    // One failure per attempt: the initial dispatch plus two retries.
    let mut fails = 0;
    while let Ok(ev) = events.try_recv() {
        if ev.event == StateEvent::Fail {
            fails += 1;
        }
    }
    assert_eq!(fails, 3);

    processor.shutdown().await.unwrap();
}

#[tokio::test]
async fn cancel_during_dedup_checking_settles_as_cancelled() {
    // Default pacing leaves the message sitting in DedupChecking long enough
    // to cancel it there.
    let mut cfg = Config::default();
    cfg.engine.poll_interval = Duration::from_millis(10);
    let processor = MessageProcessor::new(cfg);

    let message = Message::new("ORDER", "x").with_id("S6");
    let (result, cancel_ack) = tokio::join!(processor.submit(message), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(processor.state_of("S6"), Some(MsgState::DedupChecking));
        processor.cancel("S6")
    });

    assert!(cancel_ack.is_success(), "cancel rejected: {cancel_ack}");
    assert!(result.is_failed());
    assert_eq!(result.detail(), "Message cancelled");
    assert_eq!(processor.state_of("S6"), Some(MsgState::Cancelled));

    processor.shutdown().await.unwrap();
}

/// Transport whose send never resolves; only the state deadline can move the
/// message on.
struct StallTransport;

#[async_trait]
impl Transport for StallTransport {
    async fn send(&self, _message: &Message) -> Result<(), TransportError> {
        futures::future::pending().await
    }

    async fn confirm(&self, _message: &Message) -> Result<Confirmation, TransportError> {
        futures::future::pending().await
    }
}

#[tokio::test]
async fn a_stalled_dispatch_times_out_exactly_once() {
    let mut cfg = quick_config();
    cfg.timeouts.set(MsgState::Sending, Duration::from_millis(100));
    cfg.retry.max_retries = 0;
    let processor = MessageProcessor::with_transport(cfg, Arc::new(StallTransport));

    let mut events = processor.subscribe();
    let result = processor.submit(Message::new("ORDER", "stuck")).await;

    assert!(result.is_failed());
    assert_eq!(result.detail(), "Message moved to dead letter queue");

    let mut timeouts = 0;
    while let Ok(ev) = events.try_recv() {
        if ev.to == MsgState::Timeout {
            timeouts += 1;
        }
    }
    assert_eq!(timeouts, 1);

    processor.shutdown().await.unwrap();
}

/// Transport that confirms partially on the first round and fully on the
/// second.
struct TwoRoundTransport {
    confirmed_once: AtomicBool,
}

#[async_trait]
impl Transport for TwoRoundTransport {
    async fn send(&self, _message: &Message) -> Result<(), TransportError> {
        Ok(())
    }

    async fn confirm(&self, _message: &Message) -> Result<Confirmation, TransportError> {
        if self.confirmed_once.swap(true, Ordering::SeqCst) {
            Ok(Confirmation::Full)
        } else {
            Ok(Confirmation::Partial)
        }
    }
}

#[tokio::test]
async fn partial_confirmation_resolves_on_the_next_round() {
    let processor = MessageProcessor::with_transport(
        quick_config(),
        Arc::new(TwoRoundTransport {
            confirmed_once: AtomicBool::new(false),
        }),
    );

    let mut events = processor.subscribe();
    let result = processor.submit(Message::new("ORDER", "multicast")).await;
    assert!(result.is_success());

    let mut saw_partial = false;
    while let Ok(ev) = events.try_recv() {
        if ev.to == MsgState::PartialConfirmed {
            saw_partial = true;
        }
    }
    assert!(saw_partial, "the first round should confirm partially");

    processor.shutdown().await.unwrap();
}

#[tokio::test]
async fn archiving_removes_the_machine_from_the_registry() {
    let processor = MessageProcessor::new(quick_config());

    let message = Message::new("ORDER", "x").with_id("ARCH-1");
    assert!(processor.submit(message).await.is_success());
    assert_eq!(processor.state_of("ARCH-1"), Some(MsgState::Confirmed));

    assert!(processor.archive("ARCH-1").is_success());
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if processor.state_of("ARCH-1").is_none() {
            break;
        }
    }
    assert_eq!(processor.state_of("ARCH-1"), None);

    processor.shutdown().await.unwrap();
}

#[tokio::test]
async fn batch_submission_aggregates_outcomes() {
    let mut cfg = quick_config();
    cfg.retry.max_retries = 0;
    cfg.retry.base_delay = Duration::from_millis(50);
    let processor = MessageProcessor::new(cfg);

    let batch = processor
        .submit_batch(vec![
            Message::new("ORDER", "a"),
            Message::new("ORDER", "b"),
            Message::new("ORDER", "c").with_tag(TAG_SIMULATE_FAILURE, "true"),
        ])
        .await;

    assert_eq!(batch.total(), 3);
    assert_eq!(batch.succeeded(), 2);
    assert_eq!(batch.failed(), 1);

    processor.shutdown().await.unwrap();
}

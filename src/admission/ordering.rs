//! # Per-partition ordered release.
//!
//! [`OrderingCoordinator`] gates messages so that, inside a partition, they
//! are released strictly by sequence number.
//!
//! - **Partition key**: the `partitionKey` tag, else the topic, else the
//!   configured fallback key.
//! - **Sequence**: the `sequence` tag parsed as an integer, else the
//!   message's creation timestamp. Sequences should start at 1 and be
//!   strictly monotone; out-of-domain values are tolerated with a warning.
//!
//! ## Gate logic
//! For a message with sequence `s` against the partition cursor `next`:
//! - `s == next` → released immediately
//! - `s > next`  → parked in the partition's bounded waiting queue; the
//!   returned [`Notify`] fires when the cursor reaches `s`
//! - `s < next`  → a late duplicate or reorder fault; never parked in the
//!   queue. The configured [`LatePolicy`] decides whether the caller should
//!   treat it as released or leave it to its waiting-state deadline.
//!
//! ## Release
//! [`OrderingCoordinator::complete`] advances the cursor by one and notifies
//! every parked entry whose sequence equals the new cursor. A released
//! message advances the cursor again through its own completion, so a
//! contiguous run of parked messages drains one at a time, in order.
//!
//! ## Architecture
//! ```text
//! admit(msg)                          complete(msg)
//!     │                                    │
//!     ▼                                    ▼
//! DashMap<key, Arc<Mutex<Partition>>>  cursor += 1
//!     │  { next_expected,                  │
//!     ▼    waiting: VecDeque }             └─► notify parked entries at cursor
//!  Ready / Parked(Notify) / Late
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::OrderingConfig;
use crate::message::{Message, TAG_PARTITION_KEY, TAG_SEQUENCE};

/// Policy for sequences already behind the partition cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatePolicy {
    /// Leave the message in its waiting state; its deadline routes it to the
    /// retry path. Safe default when a late sequence usually means a
    /// duplicate.
    Park,
    /// Release immediately, tolerating the reorder. Use when late arrivals
    /// are legitimate redeliveries that must still be processed.
    Release,
}

/// Outcome of the ordering gate for one message.
pub enum OrderDecision {
    /// The sequence matches the cursor; proceed.
    Ready,
    /// Ahead of the cursor; parked. The notify fires on release.
    Parked(Arc<Notify>),
    /// Behind the cursor under [`LatePolicy::Park`]; not enqueued.
    Late,
}

struct ParkedEntry {
    sequence: u64,
    message_id: String,
    notify: Arc<Notify>,
}

struct Partition {
    next_expected: u64,
    waiting: VecDeque<ParkedEntry>,
}

impl Partition {
    fn new() -> Self {
        Self {
            next_expected: 1,
            waiting: VecDeque::new(),
        }
    }
}

/// Sequence gate over lazily created partitions.
pub struct OrderingCoordinator {
    config: OrderingConfig,
    partitions: DashMap<String, Arc<Mutex<Partition>>>,
}

impl OrderingCoordinator {
    pub fn new(config: OrderingConfig) -> Self {
        Self {
            config,
            partitions: DashMap::new(),
        }
    }

    /// Partition key for a message.
    pub fn partition_key(&self, message: &Message) -> String {
        if let Some(key) = message.tag(TAG_PARTITION_KEY) {
            return key.to_string();
        }
        if !message.topic().is_empty() {
            return message.topic().to_string();
        }
        self.config.ordering_key.clone()
    }

    /// Sequence of a message: the `sequence` tag, else the creation timestamp.
    pub fn sequence_of(&self, message: &Message) -> u64 {
        match message.tag(TAG_SEQUENCE) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(seq) => seq,
                Err(_) => {
                    warn!(id = message.id(), sequence = raw, "invalid sequence tag, using timestamp");
                    message.created_at()
                }
            },
            None => message.created_at(),
        }
    }

    /// Runs the gate for one message. Called at most once per admission.
    pub fn admit(&self, message: &Message) -> OrderDecision {
        let key = self.partition_key(message);
        let sequence = self.sequence_of(message);

        let partition = self
            .partitions
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Partition::new())))
            .clone();
        let mut partition = partition.lock();

        if sequence == partition.next_expected {
            debug!(id = message.id(), sequence, partition = %key, "in order, released");
            return OrderDecision::Ready;
        }

        if sequence > partition.next_expected {
            let notify = Arc::new(Notify::new());
            partition.waiting.push_back(ParkedEntry {
                sequence,
                message_id: message.id().to_string(),
                notify: Arc::clone(&notify),
            });
            if partition.waiting.len() > self.config.max_pending_messages {
                if let Some(evicted) = partition.waiting.pop_front() {
                    warn!(
                        partition = %key,
                        evicted = %evicted.message_id,
                        "waiting queue overflow, evicted oldest parked message"
                    );
                }
            }
            debug!(
                id = message.id(),
                sequence,
                expected = partition.next_expected,
                partition = %key,
                "ahead of cursor, parked"
            );
            return OrderDecision::Parked(notify);
        }

        warn!(
            id = message.id(),
            sequence,
            expected = partition.next_expected,
            partition = %key,
            "sequence behind cursor"
        );
        match self.config.late_policy {
            LatePolicy::Release => OrderDecision::Ready,
            LatePolicy::Park => OrderDecision::Late,
        }
    }

    /// Reports successful handling of a message: advances the partition
    /// cursor and wakes every parked entry now at the cursor.
    pub fn complete(&self, message: &Message) {
        let key = self.partition_key(message);
        let Some(partition) = self.partitions.get(&key).map(|p| Arc::clone(p.value())) else {
            return;
        };
        let mut partition = partition.lock();

        partition.next_expected += 1;
        let cursor = partition.next_expected;
        while let Some(pos) = partition
            .waiting
            .iter()
            .position(|entry| entry.sequence == cursor)
        {
            let released = partition.waiting.remove(pos);
            if let Some(released) = released {
                debug!(id = %released.message_id, sequence = cursor, partition = %key, "released");
                released.notify.notify_one();
            }
        }
    }

    /// Drops all state for a partition.
    pub fn cleanup_partition(&self, key: &str) {
        if self.partitions.remove(key).is_some() {
            debug!(partition = key, "partition cleaned up");
        }
    }

    /// Coordinator snapshot.
    pub fn stats(&self) -> OrderingStats {
        let total_waiting = self
            .partitions
            .iter()
            .map(|p| p.value().lock().waiting.len())
            .sum();
        OrderingStats {
            active_partitions: self.partitions.len(),
            total_waiting,
            max_pending_messages: self.config.max_pending_messages,
        }
    }
}

/// Occupancy of the ordering coordinator.
#[derive(Debug, Clone, Copy)]
pub struct OrderingStats {
    pub active_partitions: usize,
    pub total_waiting: usize,
    pub max_pending_messages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrderingConfig;
    use std::time::Duration;

    fn coordinator() -> OrderingCoordinator {
        OrderingCoordinator::new(OrderingConfig {
            enabled: true,
            ..OrderingConfig::default()
        })
    }

    fn msg(seq: u64) -> Message {
        Message::new("topic", "body")
            .with_tag(TAG_PARTITION_KEY, "p1")
            .with_tag(TAG_SEQUENCE, seq.to_string())
    }

    #[test]
    fn first_expected_sequence_is_one() {
        let c = coordinator();
        assert!(matches!(c.admit(&msg(1)), OrderDecision::Ready));
        assert!(matches!(c.admit(&msg(3)), OrderDecision::Parked(_)));
    }

    #[tokio::test]
    async fn out_of_order_arrivals_release_in_sequence() {
        let c = coordinator();
        let arrivals = [3u64, 1, 5, 2, 6, 4];
        let mut parked = Vec::new();

        for seq in arrivals {
            match c.admit(&msg(seq)) {
                OrderDecision::Ready => assert_eq!(seq, 1),
                OrderDecision::Parked(notify) => parked.push((seq, notify)),
                OrderDecision::Late => panic!("no late arrivals in this run"),
            }
        }

        // Completing each message in turn wakes exactly the next sequence.
        for done in 1..6u64 {
            c.complete(&msg(done));
            let next = done + 1;
            for (seq, notify) in &parked {
                let woken =
                    tokio::time::timeout(Duration::from_millis(20), notify.notified()).await;
                if *seq == next {
                    assert!(woken.is_ok(), "sequence {seq} should be released");
                } else {
                    assert!(woken.is_err(), "sequence {seq} released early");
                }
            }
        }
    }

    #[test]
    fn late_sequence_is_not_parked() {
        let c = coordinator();
        assert!(matches!(c.admit(&msg(1)), OrderDecision::Ready));
        c.complete(&msg(1));
        assert!(matches!(c.admit(&msg(1)), OrderDecision::Late));
        assert_eq!(c.stats().total_waiting, 0);
    }

    #[test]
    fn late_policy_release_lets_late_messages_through() {
        let c = OrderingCoordinator::new(OrderingConfig {
            enabled: true,
            late_policy: LatePolicy::Release,
            ..OrderingConfig::default()
        });
        assert!(matches!(c.admit(&msg(1)), OrderDecision::Ready));
        c.complete(&msg(1));
        assert!(matches!(c.admit(&msg(1)), OrderDecision::Ready));
    }

    #[test]
    fn overflow_evicts_oldest_parked() {
        let c = OrderingCoordinator::new(OrderingConfig {
            enabled: true,
            max_pending_messages: 2,
            ..OrderingConfig::default()
        });
        assert!(matches!(c.admit(&msg(10)), OrderDecision::Parked(_)));
        assert!(matches!(c.admit(&msg(11)), OrderDecision::Parked(_)));
        assert!(matches!(c.admit(&msg(12)), OrderDecision::Parked(_)));
        assert_eq!(c.stats().total_waiting, 2);
    }

    #[test]
    fn partition_key_falls_back_to_topic_then_default() {
        let c = coordinator();
        let tagged = Message::new("topic-a", "b").with_tag(TAG_PARTITION_KEY, "p9");
        assert_eq!(c.partition_key(&tagged), "p9");
        let untagged = Message::new("topic-a", "b");
        assert_eq!(c.partition_key(&untagged), "topic-a");
        let bare = Message::new("", "b");
        assert_eq!(c.partition_key(&bare), "default");
    }

    #[test]
    fn cleanup_drops_partition_state() {
        let c = coordinator();
        assert!(matches!(c.admit(&msg(5)), OrderDecision::Parked(_)));
        assert_eq!(c.stats().active_partitions, 1);
        c.cleanup_partition("p1");
        assert_eq!(c.stats().active_partitions, 0);
        // A fresh partition starts over at sequence 1.
        assert!(matches!(c.admit(&msg(1)), OrderDecision::Ready));
    }
}

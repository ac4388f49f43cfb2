//! # Message: the unit of work flowing through the pipeline.
//!
//! A [`Message`] is a uniquely identified record carrying a topic, an opaque
//! payload plus a human-readable body, timing metadata, retry accounting and a
//! keyed tag map. Two tag keys are reserved for the ordering coordinator:
//!
//! - [`TAG_PARTITION_KEY`] groups messages into a partition
//! - [`TAG_SEQUENCE`] is the monotone release position inside the partition
//!
//! All other tags are opaque to the engine.
//!
//! ## Rules
//! - The identifier is immutable after creation and unique within a process.
//! - The retry count only grows, and only when a retry is admitted.
//! - A message is expired iff `now > expire_at`; expiry is fixed at creation.
//! - State mutation is reserved to the state machine (`pub(crate)`).
//!
//! ## Example
//! ```
//! use fluxq::{Message, MsgState};
//!
//! let msg = Message::new("ORDER", "order #42 created")
//!     .with_priority(8)
//!     .with_tag("partitionKey", "p1")
//!     .with_tag("sequence", "1");
//!
//! assert_eq!(msg.state(), MsgState::Init);
//! assert_eq!(msg.tag("partitionKey"), Some("p1"));
//! assert!(!msg.is_expired());
//! ```

mod state;

pub use state::MsgState;

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Reserved tag key: partition grouping for ordered release.
pub const TAG_PARTITION_KEY: &str = "partitionKey";

/// Reserved tag key: release position inside a partition.
pub const TAG_SEQUENCE: &str = "sequence";

/// Default time-to-live applied at creation.
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default retry budget.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Wall-clock now as epoch milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// A single message moving through the pipeline.
///
/// Construct with [`Message::new`] and the `with_*` builders, then hand it to
/// the processor. Everything except the state and the retry counter is frozen
/// after submission.
#[derive(Debug, Clone)]
pub struct Message {
    id: String,
    topic: String,
    payload: Vec<u8>,
    body: String,
    state: MsgState,
    tags: BTreeMap<String, String>,
    priority: u8,
    created_at: u64,
    expire_at: u64,
    retry_count: u32,
    /// `None` until the caller or the processor's retry config sets it.
    max_retries: Option<u32>,
}

impl Message {
    /// Creates a message with a generated identifier and default settings:
    /// priority 5, three retries, five-minute expiry.
    pub fn new(topic: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        let created_at = now_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            payload: body.as_bytes().to_vec(),
            body,
            state: MsgState::Init,
            tags: BTreeMap::new(),
            priority: 5,
            created_at,
            expire_at: created_at + DEFAULT_TTL.as_millis() as u64,
            retry_count: 0,
            max_retries: None,
        }
    }

    /// Replaces the generated identifier.
    ///
    /// Callers that want content-level dedup across resubmissions must supply
    /// the same identifier, since the identifier participates in the
    /// fingerprint.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets a raw payload distinct from the body text.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Attaches a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the priority (1 low, 10 high; clamped).
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    /// Overrides the expiry deadline relative to creation.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expire_at = self.created_at + ttl.as_millis() as u64;
        self
    }

    /// Overrides the retry budget. Unset budgets inherit the processor's
    /// retry configuration at submission.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn state(&self) -> MsgState {
        self.state
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Creation timestamp, epoch milliseconds.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Expiry deadline, epoch milliseconds.
    pub fn expire_at(&self) -> u64 {
        self.expire_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    /// Looks up a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// All tags in key order.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// True once the expiry deadline has passed.
    pub fn is_expired(&self) -> bool {
        now_millis() > self.expire_at
    }

    /// True while the retry budget is not exhausted.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries()
    }

    pub(crate) fn set_state(&mut self, state: MsgState) {
        self.state = state;
    }

    pub(crate) fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    /// Applies the configured retry budget when the caller left it unset.
    pub(crate) fn apply_default_retries(&mut self, max_retries: u32) {
        if self.max_retries.is_none() {
            self.max_retries = Some(max_retries);
        }
    }
}

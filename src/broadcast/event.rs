/// Events and the reserved names every broadcaster understands
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::Instant;

/// Global publish counter value; the first event of a broadcaster is 1
pub type Sequence = u64;

/// Every subscription implicitly includes this topic
pub const SHUTDOWN_TOPIC: &str = "shutdown";

/// Kind of the goodbye event sent when a broadcaster drains
pub const CLOSE_KIND: &str = "close";

pub const CLOSE_PAYLOAD: &[u8] = b"bye";

/// One published update
///
/// Immutable once created and shared between the replay window and every
/// session queue it was delivered to.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub kind: String,
    pub sequence: Sequence,
    /// Wall-clock time, for clients
    pub timestamp: DateTime<Utc>,
    /// Monotonic time, for retention
    pub published_at: Instant,
    /// Opaque serialized snapshot
    pub payload: Vec<u8>,
}

impl Event {
    pub(crate) fn new(topic: &str, kind: &str, sequence: Sequence, payload: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            topic: topic.to_string(),
            kind: kind.to_string(),
            sequence,
            timestamp: Utc::now(),
            published_at: Instant::now(),
            payload,
        })
    }

    pub(crate) fn close(sequence: Sequence) -> Arc<Self> {
        Self::new(SHUTDOWN_TOPIC, CLOSE_KIND, sequence, CLOSE_PAYLOAD.to_vec())
    }

    pub fn is_close(&self) -> bool {
        self.topic == SHUTDOWN_TOPIC && self.kind == CLOSE_KIND
    }

    /// Payload as text, replacing invalid UTF-8
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

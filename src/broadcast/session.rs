/// Subscriber sessions: topic filter, bounded queue, replay backlog
///
/// A session moves `Connecting -> Active -> Draining -> Closed`. The
/// broadcaster pushes into it under its own lock; the transport task draws
/// from it with [`Session::next_event`], the only place the core suspends.
use super::broadcaster::Broadcaster;
use super::event::{Event, Sequence, SHUTDOWN_TOPIC};
use super::metrics::{BroadcastMetrics, SessionMetrics, SessionMetricsSnapshot};
use crate::errors::{DashError, DashResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Active,
    Draining,
    Closed,
}

// ============================================================================
// SUBSCRIPTION
// ============================================================================

/// Topic filter plus replay cursor, owned by exactly one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    topics: BTreeSet<String>,
    cursor: Option<Sequence>,
}

impl Subscription {
    /// Build a filter from requested topic names
    ///
    /// An empty request selects `baseline`. The shutdown topic is always
    /// added. A name outside `known` is rejected before anything is created.
    pub fn resolve<S: AsRef<str>>(
        requested: &[S],
        baseline: &str,
        known: &[String],
    ) -> DashResult<Self> {
        let mut topics = BTreeSet::new();

        for topic in requested {
            let topic = topic.as_ref().trim();
            if topic.is_empty() {
                continue;
            }
            if topic != SHUTDOWN_TOPIC && !known.iter().any(|k| k == topic) {
                return Err(DashError::UnknownTopic {
                    topic: topic.to_string(),
                    supported: known
                        .iter()
                        .map(|k| format!("{:?}", k))
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
            topics.insert(topic.to_string());
        }

        if topics.is_empty() || topics.iter().all(|t| t == SHUTDOWN_TOPIC) {
            topics.insert(baseline.to_string());
        }
        topics.insert(SHUTDOWN_TOPIC.to_string());

        Ok(Self {
            topics,
            cursor: None,
        })
    }

    pub fn with_cursor(mut self, cursor: Option<Sequence>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    /// Sequence of the last event handed to the transport
    pub fn cursor(&self) -> Option<Sequence> {
        self.cursor
    }
}

// ============================================================================
// SHARED SESSION STATE
// ============================================================================

/// Outcome of offering an event to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest undelivered event
    QueuedDroppedOldest,
    NotMatched,
    Rejected,
}

struct SessionInner {
    state: SessionState,
    subscription: Subscription,
    /// Replay snapshot taken at subscribe time, drained before `queue`
    backlog: VecDeque<Arc<Event>>,
    /// Live events, bounded by `capacity`
    queue: VecDeque<Arc<Event>>,
}

pub(crate) struct SessionShared {
    id: SessionId,
    capacity: usize,
    inner: Mutex<SessionInner>,
    ready: Notify,
    metrics: Arc<SessionMetrics>,
    hub_metrics: Arc<BroadcastMetrics>,
}

impl SessionShared {
    pub(crate) fn new(
        id: SessionId,
        subscription: Subscription,
        capacity: usize,
        hub_metrics: Arc<BroadcastMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            capacity: capacity.max(1),
            inner: Mutex::new(SessionInner {
                state: SessionState::Connecting,
                subscription,
                backlog: VecDeque::new(),
                queue: VecDeque::new(),
            }),
            ready: Notify::new(),
            metrics: SessionMetrics::new(),
            hub_metrics,
        })
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// `Connecting -> Active`, seeding the replay backlog
    pub(crate) fn activate(&self, backlog: Vec<Arc<Event>>) {
        let replayed = backlog.len() as u64;
        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Connecting {
                return;
            }
            inner.backlog.extend(backlog);
            inner.state = SessionState::Active;
        }
        if replayed > 0 {
            self.metrics.add_replayed(replayed);
            self.hub_metrics.events_replayed(replayed);
            self.ready.notify_one();
        }
    }

    /// Offer a live event; never blocks
    ///
    /// Only Active sessions take events, and only those matching the filter.
    pub(crate) fn push(&self, event: Arc<Event>) -> PushOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Active {
                return PushOutcome::Rejected;
            }
            if !inner.subscription.matches(&event.topic) {
                return PushOutcome::NotMatched;
            }
            self.enqueue(&mut inner, event)
        };
        self.after_enqueue(outcome);
        outcome
    }

    /// `Active -> Draining` with `close` queued in the same critical section
    ///
    /// A reader can never observe Draining without the goodbye already
    /// queued, so it always receives it before `next` returns `None`.
    pub(crate) fn drain_with(&self, close: Arc<Event>) -> PushOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, SessionState::Connecting | SessionState::Active) {
                return PushOutcome::Rejected;
            }
            inner.state = SessionState::Draining;
            self.enqueue(&mut inner, close)
        };
        self.after_enqueue(outcome);
        outcome
    }

    fn enqueue(&self, inner: &mut SessionInner, event: Arc<Event>) -> PushOutcome {
        let mut outcome = PushOutcome::Queued;
        if inner.queue.len() >= self.capacity {
            inner.queue.pop_front();
            outcome = PushOutcome::QueuedDroppedOldest;
        }
        inner.queue.push_back(event);
        self.metrics.set_queue_depth(inner.queue.len());
        outcome
    }

    fn after_enqueue(&self, outcome: PushOutcome) {
        if outcome == PushOutcome::QueuedDroppedOldest {
            self.metrics.inc_dropped();
            self.hub_metrics.events_dropped(1);
        }
        self.ready.notify_one();
    }

    /// Release queues and wake the reader. Idempotent.
    pub(crate) fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Closed {
                return;
            }
            inner.state = SessionState::Closed;
            inner.backlog.clear();
            inner.queue.clear();
        }
        self.metrics.set_queue_depth(0);
        self.ready.notify_one();
    }

    /// Next event in delivery order, or `None` once there is nothing more
    ///
    /// Cancel-safe: dropping the future loses no event.
    pub(crate) async fn next(&self) -> Option<Arc<Event>> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.state == SessionState::Closed {
                    return None;
                }

                let next = match inner.backlog.pop_front() {
                    Some(event) => Some(event),
                    None => {
                        let event = inner.queue.pop_front();
                        if event.is_some() {
                            self.metrics.set_queue_depth(inner.queue.len());
                        }
                        event
                    }
                };

                if let Some(event) = next {
                    debug_assert!(inner
                        .subscription
                        .cursor
                        .map_or(true, |c| c < event.sequence));
                    inner.subscription.cursor = Some(event.sequence);
                    drop(inner);
                    self.metrics.inc_delivered();
                    self.hub_metrics.event_delivered();
                    return Some(event);
                }

                if inner.state == SessionState::Draining {
                    return None;
                }
            }
            self.ready.notified().await;
        }
    }

    pub(crate) fn cursor(&self) -> Option<Sequence> {
        self.inner.lock().subscription.cursor
    }

    pub(crate) fn topics(&self) -> Vec<String> {
        self.inner
            .lock()
            .subscription
            .topics()
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn metrics(&self) -> SessionMetricsSnapshot {
        self.metrics.snapshot()
    }
}

// ============================================================================
// SESSION HANDLE
// ============================================================================

/// Handle held by one transport connection
///
/// Dropping it unsubscribes from the broadcaster.
pub struct Session {
    shared: Arc<SessionShared>,
    broadcaster: Weak<Broadcaster>,
}

impl Session {
    pub(crate) fn new(shared: Arc<SessionShared>, broadcaster: Weak<Broadcaster>) -> Self {
        Self {
            shared,
            broadcaster,
        }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn cursor(&self) -> Option<Sequence> {
        self.shared.cursor()
    }

    pub fn topics(&self) -> Vec<String> {
        self.shared.topics()
    }

    pub fn metrics(&self) -> SessionMetricsSnapshot {
        self.shared.metrics()
    }

    /// Wait for the next event; `None` means the stream is over
    pub async fn next_event(&self) -> Option<Arc<Event>> {
        self.shared.next().await
    }

    /// Disconnect explicitly (same as dropping)
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        match self.broadcaster.upgrade() {
            Some(broadcaster) => {
                broadcaster.unsubscribe(self.shared.id());
            }
            None => self.shared.close(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("cursor", &self.cursor())
            .finish()
    }
}

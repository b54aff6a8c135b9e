/// Topic-partitioned publish/subscribe with replay and coordinated shutdown
///
/// One broadcaster per module (plus the system one). All mutable state sits
/// behind a single short-held mutex: publish, subscribe, unsubscribe and
/// garbage collection only move `Arc<Event>`s between in-memory queues while
/// holding it, so no operation waits on a subscriber.
use super::event::{Event, Sequence};
use super::metrics::{BroadcastMetrics, BroadcastMetricsSnapshot};
use super::replay::ReplayWindow;
use super::session::{PushOutcome, Session, SessionId, SessionShared, Subscription};
use crate::config::BroadcastConfig;
use crate::errors::{DashError, DashResult};
use crate::logger::{self, LogTag};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcasterPhase {
    Running,
    Draining,
    Stopped,
}

/// What `shutdown` observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Sessions open when draining began
    pub sessions: usize,
    /// Sessions that disconnected before the deadline
    pub drained: usize,
    /// Sessions closed by force at the deadline
    pub forced: usize,
}

struct BroadcasterState {
    phase: BroadcasterPhase,
    /// Last assigned sequence; 0 before the first publish
    last_sequence: Sequence,
    replay: ReplayWindow,
    sessions: HashMap<SessionId, Arc<SessionShared>>,
}

pub struct Broadcaster {
    name: String,
    baseline: String,
    topics: Vec<String>,
    queue_capacity: usize,
    gc_interval: Duration,
    state: Mutex<BroadcasterState>,
    next_session_id: AtomicU64,
    /// Signalled whenever the session table becomes empty
    idle: Notify,
    metrics: Arc<BroadcastMetrics>,
}

impl Broadcaster {
    /// `topics[0]` is the baseline used when a subscriber asks for nothing
    pub fn new(name: &str, topics: &[&str], config: &BroadcastConfig) -> DashResult<Arc<Self>> {
        let baseline = topics.first().ok_or_else(|| {
            DashError::Config(format!("Broadcaster '{}' needs at least one topic", name))
        })?;

        Ok(Arc::new(Self {
            name: name.to_string(),
            baseline: baseline.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            queue_capacity: config.session_queue_capacity.max(1),
            gc_interval: config.gc_interval(),
            state: Mutex::new(BroadcasterState {
                phase: BroadcasterPhase::Running,
                last_sequence: 0,
                replay: ReplayWindow::new(config.replay_window()),
                sessions: HashMap::new(),
            }),
            next_session_id: AtomicU64::new(1),
            idle: Notify::new(),
            metrics: BroadcastMetrics::new(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn phase(&self) -> BroadcasterPhase {
        self.state.lock().phase
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn last_sequence(&self) -> Sequence {
        self.state.lock().last_sequence
    }

    pub fn metrics(&self) -> BroadcastMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Publish one event and return its sequence
    ///
    /// Never blocks and never fails. Sessions whose queue is full lose their
    /// oldest undelivered event instead. Once draining has begun the event
    /// is still recorded but only the goodbye reaches sessions.
    pub fn publish(&self, topic: &str, kind: &str, payload: Vec<u8>) -> Sequence {
        let mut matched = 0usize;
        let mut dropped = 0usize;

        let sequence = {
            let mut state = self.state.lock();
            state.last_sequence += 1;
            let sequence = state.last_sequence;
            let event = Event::new(topic, kind, sequence, payload);
            state.replay.push(event.clone());

            for session in state.sessions.values() {
                match session.push(event.clone()) {
                    PushOutcome::Queued => matched += 1,
                    PushOutcome::QueuedDroppedOldest => {
                        matched += 1;
                        dropped += 1;
                    }
                    PushOutcome::NotMatched | PushOutcome::Rejected => {}
                }
            }
            sequence
        };

        self.metrics.event_published();
        if logger::is_debug_enabled(&LogTag::Broadcast) {
            logger::debug(
                LogTag::Broadcast,
                &format!(
                    "{}: #{} {}/{} -> {} session(s), {} overflowed",
                    self.name, sequence, topic, kind, matched, dropped
                ),
            );
        }
        sequence
    }

    /// Open a session for `requested` topics
    ///
    /// With `since`, events still in the replay window with a greater
    /// sequence are queued ahead of live delivery. The replay snapshot and
    /// the activation happen under the same lock as publish, so nothing is
    /// delivered twice or skipped at the boundary.
    pub fn subscribe<S: AsRef<str>>(
        self: &Arc<Self>,
        requested: &[S],
        since: Option<Sequence>,
    ) -> DashResult<Session> {
        let subscription = Subscription::resolve(requested, &self.baseline, &self.topics)?;
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        let shared = {
            let mut state = self.state.lock();
            if state.phase != BroadcasterPhase::Running {
                return Err(DashError::ShuttingDown(self.name.clone()));
            }

            // A cursor ahead of us comes from an earlier process; replay nothing
            let cursor = since.map(|c| c.min(state.last_sequence));
            let backlog = match cursor {
                Some(cursor) => state
                    .replay
                    .since(cursor, Instant::now(), |e| subscription.matches(&e.topic)),
                None => Vec::new(),
            };

            let shared = SessionShared::new(
                id,
                subscription.with_cursor(cursor),
                self.queue_capacity,
                self.metrics.clone(),
            );
            shared.activate(backlog);
            state.sessions.insert(id, shared.clone());
            shared
        };

        self.metrics.session_opened();
        logger::debug(
            LogTag::Session,
            &format!(
                "{}: session {} subscribed to [{}] since {:?}",
                self.name,
                id,
                shared.topics().join(", "),
                since
            ),
        );

        Ok(Session::new(shared, Arc::downgrade(self)))
    }

    /// Remove a session and release its queue; returns false if unknown
    pub fn unsubscribe(&self, id: SessionId) -> bool {
        let (removed, now_empty) = {
            let mut state = self.state.lock();
            let removed = state.sessions.remove(&id);
            (removed, state.sessions.is_empty())
        };

        let Some(session) = removed else {
            return false;
        };
        session.close();
        self.metrics.session_closed();

        if logger::is_debug_enabled(&LogTag::Session) {
            let m = session.metrics();
            logger::debug(
                LogTag::Session,
                &format!(
                    "{}: session {} closed (delivered={}, dropped={}, replayed={}, peak_queue={})",
                    self.name, id, m.delivered, m.dropped, m.replayed, m.peak_queue_depth
                ),
            );
        }

        if now_empty {
            self.idle.notify_waiters();
        }
        true
    }

    /// Drain every session with a goodbye event, bounded by `deadline`
    ///
    /// All sessions move to Draining and receive a `close` event on the
    /// shutdown topic regardless of their filter. Sessions that have not
    /// disconnected when the deadline passes are closed by force. Calling
    /// it again is a no-op.
    pub async fn shutdown(&self, deadline: Duration) -> ShutdownReport {
        let sessions = {
            let mut state = self.state.lock();
            if state.phase != BroadcasterPhase::Running {
                return ShutdownReport::default();
            }
            state.phase = BroadcasterPhase::Draining;

            state.last_sequence += 1;
            let close = Event::close(state.last_sequence);
            state.replay.push(close.clone());

            for session in state.sessions.values() {
                session.drain_with(close.clone());
            }
            state.sessions.len()
        };

        logger::info(
            LogTag::Broadcast,
            &format!("{}: draining {} session(s)", self.name, sessions),
        );

        let forced = match tokio::time::timeout(deadline, self.wait_idle()).await {
            Ok(()) => 0,
            Err(_) => self.force_close_all(),
        };

        self.state.lock().phase = BroadcasterPhase::Stopped;

        if forced > 0 {
            logger::warning(
                LogTag::Broadcast,
                &format!(
                    "{}: {} session(s) still open after {:?}, closed by force",
                    self.name, forced, deadline
                ),
            );
        }

        ShutdownReport {
            sessions,
            drained: sessions.saturating_sub(forced),
            forced,
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state.lock().sessions.is_empty() {
                return;
            }
            notified.await;
        }
    }

    fn force_close_all(&self) -> usize {
        let remaining: Vec<_> = {
            let mut state = self.state.lock();
            state.sessions.drain().map(|(_, s)| s).collect()
        };
        for session in &remaining {
            session.close();
            self.metrics.session_closed();
            self.metrics.forced_close();
        }
        remaining.len()
    }

    /// Evict replay entries past retention; returns how many were dropped
    pub fn collect_garbage(&self) -> usize {
        let (evicted, len) = {
            let mut state = self.state.lock();
            let evicted = state.replay.evict_expired(Instant::now());
            (evicted, state.replay.len())
        };
        self.metrics.set_replay_len(len);
        if evicted > 0 {
            logger::verbose(
                LogTag::Broadcast,
                &format!("{}: evicted {} replay entries ({} kept)", self.name, evicted, len),
            );
        }
        evicted
    }

    /// Periodic replay sweep until `cancel` fires
    pub fn spawn_gc(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(broadcaster.gc_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        broadcaster.collect_garbage();
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("name", &self.name)
            .field("topics", &self.topics)
            .field("phase", &self.phase())
            .finish()
    }
}

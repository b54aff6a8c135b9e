use serde::Serialize;
/// Delivery counters for broadcasters and their sessions
///
/// Plain relaxed atomics; snapshots are for `/api/modules` and debug logs.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// SESSION METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct SessionMetrics {
    delivered: AtomicU64,
    /// Dropped because the queue was full
    dropped: AtomicU64,
    replayed: AtomicU64,
    queue_depth: AtomicUsize,
    peak_queue_depth: AtomicUsize,
}

impl SessionMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_replayed(&self, count: u64) {
        self.replayed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
        self.peak_queue_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            peak_queue_depth: self.peak_queue_depth.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionMetricsSnapshot {
    pub delivered: u64,
    pub dropped: u64,
    pub replayed: u64,
    pub queue_depth: usize,
    pub peak_queue_depth: usize,
}

// ============================================================================
// BROADCAST METRICS
// ============================================================================

/// Aggregate across every session of one broadcaster
#[derive(Debug, Default)]
pub struct BroadcastMetrics {
    sessions_opened: AtomicU64,
    sessions_active: AtomicUsize,
    events_published: AtomicU64,
    events_delivered: AtomicU64,
    events_dropped: AtomicU64,
    events_replayed: AtomicU64,
    forced_closes: AtomicU64,
    replay_len: AtomicUsize,
}

impl BroadcastMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        let _ = self
            .sessions_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_dropped(&self, count: u64) {
        self.events_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn events_replayed(&self, count: u64) {
        self.events_replayed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn forced_close(&self) {
        self.forced_closes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_replay_len(&self, len: usize) {
        self.replay_len.store(len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BroadcastMetricsSnapshot {
        BroadcastMetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_replayed: self.events_replayed.load(Ordering::Relaxed),
            forced_closes: self.forced_closes.load(Ordering::Relaxed),
            replay_len: self.replay_len.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastMetricsSnapshot {
    pub sessions_opened: u64,
    pub sessions_active: usize,
    pub events_published: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub events_replayed: u64,
    pub forced_closes: u64,
    pub replay_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_peak_depth() {
        let metrics = SessionMetrics::new();
        metrics.set_queue_depth(3);
        metrics.set_queue_depth(7);
        metrics.set_queue_depth(2);

        let snap = metrics.snapshot();
        assert_eq!(snap.queue_depth, 2);
        assert_eq!(snap.peak_queue_depth, 7);
    }

    #[test]
    fn test_active_sessions_never_underflow() {
        let metrics = BroadcastMetrics::new();
        metrics.session_opened();
        metrics.session_closed();
        metrics.session_closed();

        let snap = metrics.snapshot();
        assert_eq!(snap.sessions_opened, 1);
        assert_eq!(snap.sessions_active, 0);
    }
}

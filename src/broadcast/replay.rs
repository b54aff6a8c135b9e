/// Time-bounded history of recent events across all topics
///
/// Entries are kept in publish order, so the buffer is sorted by both
/// sequence and publish instant. Reads return a snapshot of `Arc`s; an
/// eviction running afterwards never invalidates what a reader holds.
use super::event::{Event, Sequence};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct ReplayWindow {
    retention: Duration,
    events: VecDeque<Arc<Event>>,
}

impl ReplayWindow {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            events: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: Arc<Event>) {
        debug_assert!(self
            .events
            .back()
            .map_or(true, |last| last.sequence < event.sequence));
        self.events.push_back(event);
    }

    fn is_expired(&self, event: &Event, now: Instant) -> bool {
        now.saturating_duration_since(event.published_at) > self.retention
    }

    /// Events with `sequence > cursor` still inside the window, in order
    pub fn since<F>(&self, cursor: Sequence, now: Instant, mut matches: F) -> Vec<Arc<Event>>
    where
        F: FnMut(&Event) -> bool,
    {
        let start = self.events.partition_point(|e| e.sequence <= cursor);
        self.events
            .range(start..)
            .filter(|e| !self.is_expired(e, now) && matches(e))
            .cloned()
            .collect()
    }

    /// Drop everything older than the retention window; returns how many
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let mut evicted = 0;
        while let Some(front) = self.events.front() {
            if !self.is_expired(front, now) {
                break;
            }
            self.events.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_with(topics: &[&str]) -> ReplayWindow {
        let mut window = ReplayWindow::new(Duration::from_secs(300));
        for (i, topic) in topics.iter().enumerate() {
            window.push(Event::new(topic, "sample", i as Sequence + 1, Vec::new()));
        }
        window
    }

    #[tokio::test(start_paused = true)]
    async fn test_since_respects_cursor_and_filter() {
        let window = window_with(&["host", "docker", "host", "host"]);
        let now = Instant::now();

        let all: Vec<_> = window.since(0, now, |_| true).iter().map(|e| e.sequence).collect();
        assert_eq!(all, vec![1, 2, 3, 4]);

        let host_after_1: Vec<_> = window
            .since(1, now, |e| e.topic == "host")
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(host_after_1, vec![3, 4]);

        assert!(window.since(4, now, |_| true).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_by_age() {
        let mut window = window_with(&["host", "host"]);
        tokio::time::advance(Duration::from_secs(200)).await;
        window.push(Event::new("host", "sample", 3, Vec::new()));
        tokio::time::advance(Duration::from_secs(150)).await;

        let now = Instant::now();
        // The first two are 350s old, the third 150s
        let visible: Vec<_> = window.since(0, now, |_| true).iter().map(|e| e.sequence).collect();
        assert_eq!(visible, vec![3]);

        assert_eq!(window.evict_expired(now), 2);
        assert_eq!(window.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_survives_eviction() {
        let mut window = window_with(&["host", "host", "host"]);
        let snapshot = window.since(0, Instant::now(), |_| true);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(window.evict_expired(Instant::now()), 3);
        assert!(window.is_empty());

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[2].sequence, 3);
    }
}

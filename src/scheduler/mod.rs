/// Poll scheduler: one periodic task per enabled module
///
/// Each task ticks on its own interval, runs the module's collection step
/// under a timeout, publishes every returned sample and caches it as the
/// module's latest state. A failed tick is logged and skipped; the task
/// only ends when the shared cancellation token fires.
use crate::broadcast::Broadcaster;
use crate::config::{ModuleConfig, SchedulerConfig};
use crate::errors::{DashError, DashResult};
use crate::logger::{self, LogTag};
use crate::modules::{CollectContext, Module, ModuleState};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct PollScheduler {
    config: SchedulerConfig,
    cancel: CancellationToken,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl PollScheduler {
    /// Tasks spawned here stop when `cancel` (or its parent) is cancelled
    pub fn new(config: SchedulerConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            handles: Vec::new(),
        }
    }

    /// Interval precedence: `[modules.<name>]`, then the module's own
    /// override, then the uniform default
    pub fn interval_for(&self, module: &dyn Module, module_config: &ModuleConfig) -> Duration {
        module_config
            .poll_interval_secs
            .map(Duration::from_secs)
            .or_else(|| module.poll_interval())
            .unwrap_or_else(|| self.config.poll_interval())
            .max(Duration::from_millis(100))
    }

    pub fn spawn(
        &mut self,
        module: Arc<dyn Module>,
        hub: Arc<Broadcaster>,
        state: Arc<ModuleState>,
        interval: Duration,
    ) {
        let name = module.name().to_string();
        let cancel = self.cancel.child_token();
        let collect_timeout = self.config.collect_timeout();

        logger::info(
            LogTag::Scheduler,
            &format!("Starting poller for {} every {:?}", name, interval),
        );

        let handle = tokio::spawn(poll_loop(module, hub, state, interval, collect_timeout, cancel));
        self.handles.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel every poller and wait up to `grace` for each; stragglers are
    /// aborted. Returns how many had to be aborted.
    pub async fn join(self, grace: Duration) -> usize {
        self.cancel.cancel();

        let mut aborted = 0;
        for (name, mut handle) in self.handles {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {
                    logger::debug(LogTag::Scheduler, &format!("Poller {} stopped", name));
                }
                Ok(Err(e)) => {
                    logger::error(LogTag::Scheduler, &format!("Poller {} ended abnormally: {}", name, e));
                }
                Err(_) => {
                    handle.abort();
                    aborted += 1;
                    logger::warning(
                        LogTag::Scheduler,
                        &format!("Poller {} did not stop within {:?}, aborted", name, grace),
                    );
                }
            }
        }
        aborted
    }
}

async fn poll_loop(
    module: Arc<dyn Module>,
    hub: Arc<Broadcaster>,
    state: Arc<ModuleState>,
    interval: Duration,
    collect_timeout: Duration,
    cancel: CancellationToken,
) {
    let tag = LogTag::for_module(module.name());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tick += 1;
        let before = state.health();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = poll_once(module.as_ref(), &hub, &state, collect_timeout, &cancel, tick) => {
                match result {
                    Ok(published) => {
                        if before.is_degraded() || before.is_unhealthy() {
                            logger::info(tag.clone(), &format!("{} recovered on tick {}", module.name(), tick));
                        }
                        logger::verbose(
                            tag.clone(),
                            &format!("tick {}: published {} event(s)", tick, published),
                        );
                    }
                    Err(e) => {
                        state.record_failure(&e.to_string());
                        let message = format!("{} poll failed, skipping tick {}: {}", module.name(), tick, e);
                        if e.is_recoverable() {
                            logger::warning(tag.clone(), &message);
                        } else {
                            logger::error(tag.clone(), &message);
                        }
                        if !before.is_unhealthy() && state.health().is_unhealthy() {
                            logger::error(
                                tag.clone(),
                                &format!("{} is now unhealthy after repeated failures", module.name()),
                            );
                        }
                    }
                }
            }
        }
    }

    logger::debug(
        LogTag::Scheduler,
        &format!("Poller for {} exiting after {} tick(s)", module.name(), tick),
    );
}

/// Run one collection and publish its samples; returns the event count
///
/// The collection gets a child token that is cancelled as soon as this
/// returns or is dropped, so nothing it started outlives the tick.
pub async fn poll_once(
    module: &dyn Module,
    hub: &Broadcaster,
    state: &ModuleState,
    collect_timeout: Duration,
    cancel: &CancellationToken,
    tick: u64,
) -> DashResult<usize> {
    let child = cancel.child_token();
    let _guard = child.clone().drop_guard();
    let ctx = CollectContext::new(child, collect_timeout, tick);

    let samples = tokio::time::timeout(collect_timeout, module.collect(&ctx))
        .await
        .map_err(|_| DashError::CollectTimeout {
            millis: collect_timeout.as_millis() as u64,
        })??;

    for sample in &samples {
        let payload = serde_json::to_vec(&sample.payload)?;
        hub.publish(&sample.topic, &sample.kind, payload);
    }
    state.record_success(&samples);
    Ok(samples.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BroadcastConfig;
    use crate::modules::testing::FakeModule;
    use crate::modules::{ModuleHealth, Sample};
    use std::sync::atomic::Ordering;

    fn hub() -> Arc<Broadcaster> {
        Broadcaster::new("fake", &["fake"], &BroadcastConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_interval_until_cancelled() {
        let module = FakeModule::new("Fake", "fake", &["fake"]).arc();
        let hub = hub();
        let state = Arc::new(ModuleState::new());
        let cancel = CancellationToken::new();

        let mut scheduler = PollScheduler::new(SchedulerConfig::default(), cancel.clone());
        scheduler.spawn(module.clone(), hub.clone(), state.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(module.collected.load(Ordering::SeqCst), 4);
        assert_eq!(hub.last_sequence(), 4);
        assert_eq!(state.latest("tick"), Some(serde_json::json!({"n": 4})));

        cancel.cancel();
        assert_eq!(scheduler.join(Duration::from_secs(1)).await, 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(module.collected.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_is_skipped_not_fatal() {
        let module = FakeModule::new("Fake", "fake", &["fake"]).arc();
        module.push_result(Err(DashError::Collect("daemon restarting".to_string())));
        module.push_result(Ok(vec![
            Sample::new("fake", "mem", serde_json::json!({"used": 10})).unwrap(),
            Sample::new("fake", "load", serde_json::json!({"load1": 0.5})).unwrap(),
        ]));

        let hub = hub();
        let session = hub.subscribe(&["fake"], None).unwrap();
        let state = Arc::new(ModuleState::new());
        let mut scheduler = PollScheduler::new(SchedulerConfig::default(), CancellationToken::new());
        scheduler.spawn(module.clone(), hub.clone(), state.clone(), Duration::from_secs(3));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(state.health().is_degraded());
        assert_eq!(hub.last_sequence(), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let mem = session.next_event().await.unwrap();
        let load = session.next_event().await.unwrap();
        assert_eq!((mem.kind.as_str(), mem.sequence), ("mem", 1));
        assert_eq!((load.kind.as_str(), load.sequence), ("load", 2));
        assert_eq!(mem.payload, br#"{"used":10}"#.to_vec());
        assert!(state.health().is_healthy());

        scheduler.join(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_collection_times_out() {
        let module = FakeModule::new("Fake", "fake", &["fake"])
            .with_delay(Duration::from_secs(60))
            .arc();
        let hub = hub();
        let state = ModuleState::new();
        let cancel = CancellationToken::new();

        let err = poll_once(module.as_ref(), &hub, &state, Duration::from_secs(10), &cancel, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DashError::CollectTimeout { millis: 10_000 }));
        assert_eq!(hub.last_sequence(), 0);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_inflight_collection() {
        let module = FakeModule::new("Fake", "fake", &["fake"])
            .with_delay(Duration::from_secs(60))
            .arc();
        let state = Arc::new(ModuleState::new());
        let cancel = CancellationToken::new();
        let mut scheduler = PollScheduler::new(
            SchedulerConfig {
                collect_timeout_secs: 120,
                ..Default::default()
            },
            cancel.clone(),
        );
        scheduler.spawn(module.clone(), hub(), state.clone(), Duration::from_secs(3));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(module.collected.load(Ordering::SeqCst), 1);

        let started = tokio::time::Instant::now();
        assert_eq!(scheduler.join(Duration::from_secs(2)).await, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(state.health(), ModuleHealth::Starting);
    }

    #[test]
    fn test_interval_precedence() {
        let scheduler = PollScheduler::new(SchedulerConfig::default(), CancellationToken::new());
        let plain = FakeModule::new("A", "a", &["a"]);
        let custom = FakeModule::new("B", "b", &["b"]).with_interval(Duration::from_secs(10));

        let none = ModuleConfig::default();
        let five = ModuleConfig {
            poll_interval_secs: Some(5),
            ..Default::default()
        };

        assert_eq!(scheduler.interval_for(&plain, &none), Duration::from_secs(3));
        assert_eq!(scheduler.interval_for(&custom, &none), Duration::from_secs(10));
        assert_eq!(scheduler.interval_for(&custom, &five), Duration::from_secs(5));
    }
}

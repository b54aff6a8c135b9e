//! Probe-backed modules and the registry that decides which ones run
//!
//! A module is a data source (host stats, container runtime, units...)
//! exposed through the [`Module`] capability trait. The registry probes each
//! candidate once at startup; the enabled set never changes afterwards.

mod health;
mod registry;
mod state;

pub use health::ModuleHealth;
pub use registry::{EvaluatedRegistry, ModuleDescriptor, ModuleRegistry, RegistryEntry};
pub use state::{ModuleState, ModuleStatus};

use crate::errors::DashResult;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One logical sub-metric produced by a poll
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub topic: String,
    pub kind: String,
    pub payload: Value,
}

impl Sample {
    pub fn new<T: Serialize>(topic: &str, kind: &str, payload: T) -> DashResult<Self> {
        Ok(Self {
            topic: topic.to_string(),
            kind: kind.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// Bounded-lifetime context handed to [`Module::collect`]
///
/// The token is cancelled when the tick's deadline passes or the process
/// shuts down; long collections should check it between steps.
#[derive(Debug, Clone)]
pub struct CollectContext {
    pub cancel: CancellationToken,
    pub deadline: Instant,
    /// 1-based tick counter of the poll loop
    pub tick: u64,
}

impl CollectContext {
    pub fn new(cancel: CancellationToken, timeout: Duration, tick: u64) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + timeout,
            tick,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Capability interface every data source implements
#[async_trait]
pub trait Module: Send + Sync {
    /// Display name, also the `[modules.<name>]` config key (lowercased)
    fn name(&self) -> &'static str;

    /// Path under `/api/` where the module's routes are mounted
    fn route_root(&self) -> &'static str;

    /// Topics this module publishes; the first is the baseline
    fn topics(&self) -> Vec<&'static str>;

    /// Override of the scheduler's uniform interval
    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    /// Whether the data source is usable on this host
    ///
    /// `Ok(false)` and `Err(_)` both disable the module for the process run.
    async fn should_enable(&self) -> DashResult<bool>;

    /// Poll once
    async fn collect(&self, ctx: &CollectContext) -> DashResult<Vec<Sample>>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-memory module for registry, scheduler and route tests

    use super::*;
    use crate::errors::DashError;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub enum Probe {
        Enable,
        Decline,
        Fail,
        Panic,
        Hang,
    }

    pub struct FakeModule {
        pub name: &'static str,
        pub root: &'static str,
        pub topics: Vec<&'static str>,
        pub probe: Probe,
        pub interval: Option<Duration>,
        /// Scripted results, consumed one per tick; empty means a default sample
        pub script: Mutex<VecDeque<DashResult<Vec<Sample>>>>,
        pub probed: AtomicU64,
        pub collected: AtomicU64,
        pub collect_delay: Option<Duration>,
    }

    impl FakeModule {
        pub fn new(name: &'static str, root: &'static str, topics: &[&'static str]) -> Self {
            Self {
                name,
                root,
                topics: topics.to_vec(),
                probe: Probe::Enable,
                interval: None,
                script: Mutex::new(VecDeque::new()),
                probed: AtomicU64::new(0),
                collected: AtomicU64::new(0),
                collect_delay: None,
            }
        }

        pub fn with_probe(mut self, probe: Probe) -> Self {
            self.probe = probe;
            self
        }

        pub fn with_interval(mut self, interval: Duration) -> Self {
            self.interval = Some(interval);
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.collect_delay = Some(delay);
            self
        }

        pub fn push_result(&self, result: DashResult<Vec<Sample>>) {
            self.script.lock().push_back(result);
        }

        pub fn arc(self) -> Arc<Self> {
            Arc::new(self)
        }
    }

    #[async_trait]
    impl Module for FakeModule {
        fn name(&self) -> &'static str {
            self.name
        }

        fn route_root(&self) -> &'static str {
            self.root
        }

        fn topics(&self) -> Vec<&'static str> {
            self.topics.clone()
        }

        fn poll_interval(&self) -> Option<Duration> {
            self.interval
        }

        async fn should_enable(&self) -> DashResult<bool> {
            self.probed.fetch_add(1, Ordering::SeqCst);
            match self.probe {
                Probe::Enable => Ok(true),
                Probe::Decline => Ok(false),
                Probe::Fail => Err(DashError::ProbeUnavailable(format!("{} socket missing", self.name))),
                Probe::Panic => panic!("probe for {} exploded", self.name),
                Probe::Hang => {
                    std::future::pending::<()>().await;
                    Ok(true)
                }
            }
        }

        async fn collect(&self, ctx: &CollectContext) -> DashResult<Vec<Sample>> {
            let n = self.collected.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.collect_delay {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(DashError::Collect("cancelled".to_string())),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if let Some(result) = self.script.lock().pop_front() {
                return result;
            }
            Ok(vec![Sample::new(self.topics[0], "tick", serde_json::json!({ "n": n }))?])
        }
    }
}

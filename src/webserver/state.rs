/// Shared application state handed to every route
use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::errors::{DashError, DashResult};
use crate::modules::{EvaluatedRegistry, ModuleDescriptor, ModuleState};
use crate::system_events::{SystemEvents, SYSTEM_ROUTE_ROOT, SYSTEM_TOPIC};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything the routes need for one mounted stream
#[derive(Clone)]
pub struct ModuleRuntime {
    pub descriptor: ModuleDescriptor,
    pub hub: Arc<Broadcaster>,
    pub state: Arc<ModuleState>,
}

/// Route root of the runtime a nested router serves
#[derive(Debug, Clone)]
pub struct ModuleKey(pub String);

pub struct AppState {
    pub config: Arc<Config>,
    pub registry: EvaluatedRegistry,
    pub system: SystemEvents,
    pub startup_time: DateTime<Utc>,
    /// Keyed by route root
    runtimes: BTreeMap<String, ModuleRuntime>,
}

impl AppState {
    /// The system event stream is mounted from the start
    pub fn new(config: Arc<Config>, registry: EvaluatedRegistry, system: SystemEvents) -> Self {
        let mut runtimes = BTreeMap::new();
        runtimes.insert(
            SYSTEM_ROUTE_ROOT.to_string(),
            ModuleRuntime {
                descriptor: ModuleDescriptor {
                    name: "System".to_string(),
                    route_root: SYSTEM_ROUTE_ROOT.to_string(),
                    topics: vec![SYSTEM_TOPIC.to_string()],
                    enabled: true,
                    disabled_reason: None,
                },
                hub: Arc::clone(system.hub()),
                state: Arc::new(ModuleState::new()),
            },
        );

        Self {
            config,
            registry,
            system,
            startup_time: Utc::now(),
            runtimes,
        }
    }

    pub fn insert_runtime(&mut self, runtime: ModuleRuntime) {
        self.runtimes
            .insert(runtime.descriptor.route_root.clone(), runtime);
    }

    /// Runtime mounted at `root`
    ///
    /// Missing means a route was mounted before its broadcaster existed.
    pub fn runtime(&self, root: &str) -> DashResult<&ModuleRuntime> {
        self.runtimes
            .get(root)
            .ok_or_else(|| DashError::NotInitialized {
                module: root.to_string(),
            })
    }

    pub fn runtimes(&self) -> impl Iterator<Item = &ModuleRuntime> {
        self.runtimes.values()
    }

    /// Every broadcaster, system included, for the shutdown protocol
    pub fn hubs(&self) -> Vec<Arc<Broadcaster>> {
        self.runtimes.values().map(|r| Arc::clone(&r.hub)).collect()
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.startup_time).num_seconds()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::modules::testing::FakeModule;
    use crate::modules::ModuleRegistry;

    /// State with an enabled Host (topics host, host-extra) and a disabled Docker
    pub(crate) async fn test_state() -> Arc<AppState> {
        let config = Arc::new(Config::default());

        let mut registry = ModuleRegistry::new();
        registry.register(FakeModule::new("Host", "host", &["host", "host-extra"]).arc());
        registry.register(
            FakeModule::new("Docker", "virt/docker", &["docker"])
                .with_probe(crate::modules::testing::Probe::Decline)
                .arc(),
        );
        let registry = registry.evaluate(&config).await;

        let system = SystemEvents::new(&config.broadcast).unwrap();
        let mut state = AppState::new(config.clone(), registry.clone(), system);

        for entry in registry.enabled_modules() {
            let topics: Vec<&str> = entry.descriptor.topics.iter().map(String::as_str).collect();
            state.insert_runtime(ModuleRuntime {
                descriptor: entry.descriptor.clone(),
                hub: Broadcaster::new(&entry.descriptor.name, &topics, &config.broadcast).unwrap(),
                state: Arc::new(ModuleState::new()),
            });
        }
        Arc::new(state)
    }

    #[tokio::test]
    async fn test_missing_runtime_is_not_initialized() {
        let state = test_state().await;
        assert!(state.runtime("host").is_ok());
        assert!(state.runtime(SYSTEM_ROUTE_ROOT).is_ok());

        let err = state.runtime("virt/docker").err().unwrap();
        assert!(matches!(err, DashError::NotInitialized { .. }));
        assert!(err.is_fatal());
        assert_eq!(state.hubs().len(), 2);
    }
}

/// Module registry: append-only candidates, one enable pass at startup
///
/// `evaluate` consumes the registry, so it can run only once and the
/// resulting enabled set cannot be changed afterwards.
use super::Module;
use crate::config::Config;
use crate::errors::DashError;
use crate::logger::{self, LogTag};
use crate::system_events::SYSTEM_ROUTE_ROOT;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Public description of a registered module
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub route_root: String,
    pub topics: Vec<String>,
    pub enabled: bool,
    /// Why a disabled module is not running
    pub disabled_reason: Option<String>,
}

impl ModuleDescriptor {
    fn from_module(module: &dyn Module) -> Self {
        Self {
            name: module.name().to_string(),
            route_root: module.route_root().trim_matches('/').to_string(),
            topics: module.topics().iter().map(|t| t.to_string()).collect(),
            enabled: false,
            disabled_reason: None,
        }
    }

    pub fn baseline_topic(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

/// The system event stream owns its route root
fn is_reserved_root(route_root: &str) -> bool {
    route_root.trim_matches('/').eq_ignore_ascii_case(SYSTEM_ROUTE_ROOT)
}

/// How a probe attempt ended
#[derive(Debug)]
enum ProbeOutcome {
    Enabled,
    Declined,
    Failed(DashError),
    Panicked,
    TimedOut(Duration),
}

#[derive(Default)]
pub struct ModuleRegistry {
    candidates: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate; duplicates are accepted and resolved in `evaluate`
    pub fn register(&mut self, module: Arc<dyn Module>) {
        logger::debug(
            LogTag::Registry,
            &format!("Registered module candidate: {} (/{})", module.name(), module.route_root()),
        );
        self.candidates.push(module);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Decide, once, which candidates run
    ///
    /// Probes of all config-enabled candidates run concurrently, each in its
    /// own task under `probe_timeout`, so an error, panic or hang in one
    /// cannot affect the others. Decisions are then applied in registration
    /// order: a candidate whose name or route root matches an earlier
    /// enabled one is disabled as shadowed.
    pub async fn evaluate(self, config: &Config) -> EvaluatedRegistry {
        let probe_timeout = config.scheduler.probe_timeout();

        let probes = self.candidates.iter().map(|module| {
            let module = Arc::clone(module);
            let enabled_in_config = config.module(module.name()).enabled;
            let reserved = is_reserved_root(module.route_root());
            async move {
                if enabled_in_config && !reserved {
                    Some(run_probe(module, probe_timeout).await)
                } else {
                    None
                }
            }
        });
        let outcomes = join_all(probes).await;

        let mut entries: Vec<RegistryEntry> = Vec::with_capacity(self.candidates.len());
        for (module, outcome) in self.candidates.into_iter().zip(outcomes) {
            let mut descriptor = ModuleDescriptor::from_module(module.as_ref());

            let shadowed_by = entries
                .iter()
                .filter(|e| e.descriptor.enabled)
                .find(|e| {
                    e.descriptor.name.eq_ignore_ascii_case(&descriptor.name)
                        || e.descriptor.route_root == descriptor.route_root
                })
                .map(|e| e.descriptor.name.clone());

            let reason = match outcome {
                _ if is_reserved_root(&descriptor.route_root) => {
                    Some(format!("route root '{}' is reserved for system events", descriptor.route_root))
                }
                None => Some("disabled in configuration".to_string()),
                Some(ProbeOutcome::Enabled) => {
                    shadowed_by.map(|by| format!("shadowed by earlier module '{}'", by))
                }
                Some(ProbeOutcome::Declined) => Some("not available on this host".to_string()),
                Some(ProbeOutcome::Failed(e)) => Some(format!("probe failed: {}", e)),
                Some(ProbeOutcome::Panicked) => Some("probe panicked".to_string()),
                Some(ProbeOutcome::TimedOut(after)) => {
                    Some(format!("probe timed out after {:?}", after))
                }
            };

            descriptor.enabled = reason.is_none();
            descriptor.disabled_reason = reason;
            log_decision(&descriptor);

            entries.push(RegistryEntry { module, descriptor });
        }

        let enabled = entries.iter().filter(|e| e.descriptor.enabled).count();
        logger::info(
            LogTag::Registry,
            &format!("Module evaluation complete: {}/{} enabled", enabled, entries.len()),
        );

        EvaluatedRegistry { entries }
    }
}

async fn run_probe(module: Arc<dyn Module>, limit: Duration) -> ProbeOutcome {
    let probe = tokio::spawn({
        let module = Arc::clone(&module);
        async move { module.should_enable().await }
    });
    let abort = probe.abort_handle();

    match tokio::time::timeout(limit, probe).await {
        Ok(Ok(Ok(true))) => ProbeOutcome::Enabled,
        Ok(Ok(Ok(false))) => ProbeOutcome::Declined,
        Ok(Ok(Err(e))) => ProbeOutcome::Failed(e),
        Ok(Err(_join_error)) => ProbeOutcome::Panicked,
        Err(_) => {
            abort.abort();
            ProbeOutcome::TimedOut(limit)
        }
    }
}

fn log_decision(descriptor: &ModuleDescriptor) {
    match &descriptor.disabled_reason {
        None => logger::info(
            LogTag::Registry,
            &format!(
                "Module {} enabled at /api/{} (topics: {})",
                descriptor.name,
                descriptor.route_root,
                descriptor.topics.join(", ")
            ),
        ),
        Some(reason) if reason.starts_with("probe") || reason.starts_with("shadowed") => {
            logger::warning(
                LogTag::Registry,
                &format!("Module {} disabled: {}", descriptor.name, reason),
            )
        }
        Some(reason) => logger::info(
            LogTag::Registry,
            &format!("Module {} disabled: {}", descriptor.name, reason),
        ),
    }
}

/// A candidate with its frozen enable decision
#[derive(Clone)]
pub struct RegistryEntry {
    pub module: Arc<dyn Module>,
    pub descriptor: ModuleDescriptor,
}

/// Result of the single enable pass; read-only from here on
#[derive(Clone)]
pub struct EvaluatedRegistry {
    entries: Vec<RegistryEntry>,
}

impl EvaluatedRegistry {
    /// Enabled modules in registration order
    pub fn enabled_modules(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter().filter(|e| e.descriptor.enabled)
    }

    /// Every registered candidate, enabled or not
    pub fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries
            .iter()
            .find(|e| e.descriptor.enabled && e.descriptor.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleConfig;
    use crate::modules::testing::{FakeModule, Probe};
    use std::sync::atomic::Ordering;

    fn enabled_names(registry: &EvaluatedRegistry) -> Vec<String> {
        registry.enabled_modules().map(|e| e.descriptor.name.clone()).collect()
    }

    #[tokio::test]
    async fn test_failed_probe_does_not_block_others() {
        let mut registry = ModuleRegistry::new();
        registry.register(FakeModule::new("A", "a", &["a"]).with_probe(Probe::Fail).arc());
        registry.register(FakeModule::new("B", "b", &["b"]).arc());
        registry.register(FakeModule::new("C", "c", &["c"]).with_probe(Probe::Panic).arc());
        registry.register(FakeModule::new("D", "d", &["d"]).arc());

        let evaluated = registry.evaluate(&Config::default()).await;

        assert_eq!(enabled_names(&evaluated), vec!["B", "D"]);
        let a = evaluated.descriptors().find(|d| d.name == "A").unwrap();
        assert!(!a.enabled);
        assert!(a.disabled_reason.as_deref().unwrap().contains("socket missing"));
        let c = evaluated.descriptors().find(|d| d.name == "C").unwrap();
        assert_eq!(c.disabled_reason.as_deref(), Some("probe panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out() {
        let mut registry = ModuleRegistry::new();
        registry.register(FakeModule::new("Slow", "slow", &["slow"]).with_probe(Probe::Hang).arc());
        registry.register(FakeModule::new("Fast", "fast", &["fast"]).arc());

        let evaluated = registry.evaluate(&Config::default()).await;

        assert_eq!(enabled_names(&evaluated), vec!["Fast"]);
        let slow = evaluated.descriptors().next().unwrap();
        assert!(slow.disabled_reason.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_config_disabled_module_is_never_probed() {
        let docker = FakeModule::new("Docker", "virt/docker", &["docker"]).arc();
        let mut registry = ModuleRegistry::new();
        registry.register(docker.clone());

        let mut config = Config::default();
        config.modules.insert(
            "docker".to_string(),
            ModuleConfig {
                enabled: false,
                poll_interval_secs: None,
            },
        );

        let evaluated = registry.evaluate(&config).await;
        assert_eq!(evaluated.enabled_modules().count(), 0);
        assert_eq!(docker.probed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_system_events_root_is_rejected() {
        let squatter = FakeModule::new("Squatter", "/SystemEvents/", &["x"]).arc();
        let mut registry = ModuleRegistry::new();
        registry.register(squatter.clone());
        registry.register(FakeModule::new("Host", "host", &["host"]).arc());

        let evaluated = registry.evaluate(&Config::default()).await;

        assert_eq!(enabled_names(&evaluated), vec!["Host"]);
        let rejected = evaluated.descriptors().find(|d| d.name == "Squatter").unwrap();
        assert!(!rejected.enabled);
        assert!(rejected
            .disabled_reason
            .as_deref()
            .unwrap()
            .contains("reserved for system events"));
        assert_eq!(squatter.probed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicates_are_shadowed_by_first_enabled() {
        let mut registry = ModuleRegistry::new();
        registry.register(FakeModule::new("Host", "host", &["host"]).with_probe(Probe::Decline).arc());
        registry.register(FakeModule::new("Host", "host", &["host"]).arc());
        registry.register(FakeModule::new("HostCopy", "host", &["host"]).arc());
        registry.register(FakeModule::new("host", "other", &["host"]).arc());

        let evaluated = registry.evaluate(&Config::default()).await;

        // The declined first candidate does not shadow the second one
        let descriptors: Vec<_> = evaluated.descriptors().collect();
        assert!(!descriptors[0].enabled);
        assert!(descriptors[1].enabled);
        assert!(descriptors[2].disabled_reason.as_deref().unwrap().starts_with("shadowed"));
        assert!(descriptors[3].disabled_reason.as_deref().unwrap().starts_with("shadowed"));
        assert_eq!(enabled_names(&evaluated), vec!["Host"]);
        assert!(evaluated.get("HOST").is_some());
    }

    #[tokio::test]
    async fn test_enabled_modules_keep_registration_order() {
        let mut registry = ModuleRegistry::new();
        for (name, root) in [("Units", "units"), ("Host", "host"), ("Docker", "virt/docker")] {
            registry.register(FakeModule::new(name, root, &["t"]).arc());
        }
        let evaluated = registry.evaluate(&Config::default()).await;
        assert_eq!(enabled_names(&evaluated), vec!["Units", "Host", "Docker"]);
    }
}

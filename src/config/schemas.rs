/// Configuration sections, one struct per TOML table
use crate::config_struct;
use std::collections::HashMap;
use std::time::Duration;

config_struct! {
    /// `[webserver]`
    pub struct WebserverConfig {
        host: String = "0.0.0.0".to_string(),
        port: u16 = 8080,
        cors_allow_any: bool = true,
        /// Server ping cadence on WebSocket transports
        ws_heartbeat_secs: u64 = 30,
        /// Close a WebSocket that has been silent this long
        ws_idle_timeout_secs: u64 = 90,
        sse_keepalive_secs: u64 = 15,
    }
}

config_struct! {
    /// `[broadcast]`
    pub struct BroadcastConfig {
        /// How far back a reconnecting viewer can replay
        replay_window_secs: u64 = 300,
        gc_interval_secs: u64 = 60,
        /// Live events buffered per session before the oldest is dropped
        session_queue_capacity: usize = 64,
        shutdown_deadline_secs: u64 = 5,
    }
}

config_struct! {
    /// `[scheduler]`
    pub struct SchedulerConfig {
        poll_interval_secs: u64 = 3,
        collect_timeout_secs: u64 = 10,
        /// Upper bound for a single capability probe at startup
        probe_timeout_secs: u64 = 5,
        /// How long `join` waits for pollers after cancellation
        join_grace_secs: u64 = 2,
    }
}

config_struct! {
    /// `[modules.<name>]`
    pub struct ModuleConfig {
        enabled: bool = true,
        /// Overrides `[scheduler] poll_interval_secs` for this module
        poll_interval_secs: Option<u64> = None,
    }
}

config_struct! {
    /// `[logger]`
    pub struct LoggerSection {
        min_level: String = "info".to_string(),
    }
}

config_struct! {
    pub struct Config {
        webserver: WebserverConfig = WebserverConfig::default(),
        broadcast: BroadcastConfig = BroadcastConfig::default(),
        scheduler: SchedulerConfig = SchedulerConfig::default(),
        /// Keyed by lowercase module name
        modules: HashMap<String, ModuleConfig> = HashMap::new(),
        logger: LoggerSection = LoggerSection::default(),
    }
}

impl BroadcastConfig {
    pub fn replay_window(&self) -> Duration {
        Duration::from_secs(self.replay_window_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.collect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn join_grace(&self) -> Duration {
        Duration::from_secs(self.join_grace_secs)
    }
}

impl Config {
    /// Per-module section, defaulting to enabled with no override
    pub fn module(&self, name: &str) -> ModuleConfig {
        self.modules
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

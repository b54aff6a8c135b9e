/// Heartbeat and idle tracking for one WebSocket connection
use crate::config::WebserverConfig;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Server sends a ping after this much client silence
    pub heartbeat_interval: Duration,
    /// Close after this much client silence
    pub idle_timeout: Duration,
    /// Close if a ping goes unanswered this long
    pub pong_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&WebserverConfig> for HealthConfig {
    fn from(config: &WebserverConfig) -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(config.ws_heartbeat_secs),
            idle_timeout: Duration::from_secs(config.ws_idle_timeout_secs),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct ConnectionHealth {
    last_activity: Instant,
    last_ping: Option<Instant>,
    config: HealthConfig,
}

impl ConnectionHealth {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            last_activity: Instant::now(),
            last_ping: None,
            config,
        }
    }

    /// Any frame from the client counts as activity and answers a pending ping
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
        self.last_ping = None;
    }

    pub fn record_ping(&mut self) {
        self.last_ping = Some(Instant::now());
    }

    pub fn is_idle(&self) -> bool {
        self.last_activity.elapsed() > self.config.idle_timeout
    }

    pub fn is_pong_overdue(&self) -> bool {
        self.last_ping
            .map(|sent| sent.elapsed() > self.config.pong_timeout)
            .unwrap_or(false)
    }

    pub fn needs_ping(&self) -> bool {
        self.last_ping.is_none() && self.last_activity.elapsed() > self.config.heartbeat_interval
    }

    pub fn seconds_since_activity(&self) -> u64 {
        self.last_activity.elapsed().as_secs()
    }
}

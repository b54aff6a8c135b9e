/// Latest-known state of one module, served by `/current`
///
/// Written by the module's poll task after each tick, read by HTTP
/// handlers. Values are cached per sample kind so a partial tick only
/// replaces what it produced.
use super::health::ModuleHealth;
use super::Sample;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Failures in a row before the module is reported unhealthy
const UNHEALTHY_AFTER: u32 = 3;

#[derive(Debug, Default)]
struct Inner {
    latest: BTreeMap<String, Value>,
    last_success: Option<DateTime<Utc>>,
    last_poll: Option<DateTime<Utc>>,
    last_error: Option<String>,
    consecutive_failures: u32,
    polls: u64,
    failures: u64,
}

#[derive(Debug, Default)]
pub struct ModuleState {
    inner: RwLock<Inner>,
}

/// Serializable view for the modules listing
#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatus {
    pub health: ModuleHealth,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub polls: u64,
    pub failures: u64,
}

impl ModuleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, samples: &[Sample]) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        for sample in samples {
            inner.latest.insert(sample.kind.clone(), sample.payload.clone());
        }
        inner.polls += 1;
        inner.consecutive_failures = 0;
        inner.last_error = None;
        inner.last_poll = Some(now);
        inner.last_success = Some(now);
    }

    pub fn record_failure(&self, error: &str) {
        let mut inner = self.inner.write();
        inner.polls += 1;
        inner.failures += 1;
        inner.consecutive_failures += 1;
        inner.last_error = Some(error.to_string());
        inner.last_poll = Some(Utc::now());
    }

    /// Latest value per kind, as one JSON object
    pub fn snapshot(&self) -> Value {
        let inner = self.inner.read();
        Value::Object(inner.latest.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn latest(&self, kind: &str) -> Option<Value> {
        self.inner.read().latest.get(kind).cloned()
    }

    pub fn health(&self) -> ModuleHealth {
        let inner = self.inner.read();
        match (&inner.last_error, inner.consecutive_failures) {
            (_, 0) if inner.polls == 0 => ModuleHealth::Starting,
            (_, 0) => ModuleHealth::Healthy,
            (Some(err), n) if n >= UNHEALTHY_AFTER => {
                ModuleHealth::Unhealthy(format!("{} consecutive failures: {}", n, err))
            }
            (Some(err), _) => ModuleHealth::Degraded(err.clone()),
            (None, _) => ModuleHealth::Degraded("unknown error".to_string()),
        }
    }

    pub fn status(&self) -> ModuleStatus {
        let health = self.health();
        let inner = self.inner.read();
        ModuleStatus {
            health,
            last_poll: inner.last_poll,
            last_success: inner.last_success,
            last_error: inner.last_error.clone(),
            polls: inner.polls,
            failures: inner.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(kind: &str, value: Value) -> Sample {
        Sample::new("host", kind, value).unwrap()
    }

    #[test]
    fn test_latest_is_cached_per_kind() {
        let state = ModuleState::new();
        state.record_success(&[sample("cpu", json!(10)), sample("mem", json!({"used": 1}))]);
        state.record_success(&[sample("cpu", json!(42))]);

        assert_eq!(state.snapshot(), json!({"cpu": 42, "mem": {"used": 1}}));
        assert_eq!(state.latest("load"), None);
    }

    #[test]
    fn test_health_transitions() {
        let state = ModuleState::new();
        assert_eq!(state.health(), ModuleHealth::Starting);

        state.record_success(&[]);
        assert!(state.health().is_healthy());

        state.record_failure("connection refused");
        assert_eq!(state.health(), ModuleHealth::Degraded("connection refused".to_string()));

        state.record_failure("connection refused");
        state.record_failure("connection refused");
        assert!(state.health().is_unhealthy());

        state.record_success(&[]);
        assert!(state.health().is_healthy());
        assert_eq!(state.status().failures, 3);
    }
}

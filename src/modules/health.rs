use serde::Serialize;

/// Module health as reported on `/api/modules`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ModuleHealth {
    /// Last poll succeeded
    Healthy,

    /// Recent polls failed but the module is still producing
    Degraded(String),

    /// Several consecutive polls failed
    Unhealthy(String),

    /// Enabled, no poll has completed yet
    Starting,

    /// Not running in this process
    Disabled(String),
}

impl ModuleHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ModuleHealth::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ModuleHealth::Degraded(_))
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, ModuleHealth::Unhealthy(_))
    }
}

/// Subsystem tags attached to every log line

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Registry,
    Scheduler,
    Broadcast,
    Session,
    Webserver,
    Host,
    Docker,
    Podman,
    Units,
    Other(String),
}

impl LogTag {
    /// Key used by `--debug-<key>` flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system".to_string(),
            LogTag::Config => "config".to_string(),
            LogTag::Registry => "registry".to_string(),
            LogTag::Scheduler => "scheduler".to_string(),
            LogTag::Broadcast => "broadcast".to_string(),
            LogTag::Session => "session".to_string(),
            LogTag::Webserver => "webserver".to_string(),
            LogTag::Host => "host".to_string(),
            LogTag::Docker => "docker".to_string(),
            LogTag::Podman => "podman".to_string(),
            LogTag::Units => "units".to_string(),
            LogTag::Other(s) => s.to_lowercase(),
        }
    }

    /// Uppercase label for the console column
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::Webserver => "WEB".to_string(),
            LogTag::Broadcast => "BCAST".to_string(),
            LogTag::Scheduler => "SCHED".to_string(),
            other => other.to_debug_key().to_uppercase(),
        }
    }

    /// Map a probe module name to its tag
    pub fn for_module(name: &str) -> LogTag {
        match name.to_lowercase().as_str() {
            "host" => LogTag::Host,
            "docker" => LogTag::Docker,
            "podman" => LogTag::Podman,
            "units" | "systemd" => LogTag::Units,
            "system" => LogTag::System,
            other => LogTag::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}

/// Error taxonomy for hostdash
///
/// Every failure the core can observe maps onto one variant here. Only
/// initialization-ordering errors (`NotInitialized`) and configuration errors
/// are allowed to stop the process; everything else is contained to the
/// module or session that produced it.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashError {
    #[error("Broadcaster not initialized for module '{module}'")] NotInitialized {
        module: String,
    },

    #[error("invalid topic {topic:?}; supported are {supported}")] UnknownTopic {
        topic: String,
        supported: String,
    },

    #[error("Broadcaster '{0}' is shutting down")] ShuttingDown(String),

    #[error("Probe unavailable: {0}")] ProbeUnavailable(String),

    #[error("Collection failed: {0}")] Collect(String),

    #[error("Collection timed out after {millis}ms")] CollectTimeout {
        millis: u64,
    },

    #[error("Transport error: {0}")] Transport(String),

    #[error("Configuration error: {0}")] Config(String),

    #[error("IO error: {0}")] Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")] Serialization(#[from] serde_json::Error),
}

impl DashError {
    /// Transient failures that heal on the next tick or reconnect
    pub fn is_recoverable(&self) -> bool {
        match self {
            DashError::Collect(_) => true,
            DashError::CollectTimeout { .. } => true,
            DashError::Transport(_) => true,
            DashError::Io(_) => true,
            _ => false,
        }
    }

    /// Startup-ordering and configuration bugs
    pub fn is_fatal(&self) -> bool {
        matches!(self, DashError::NotInitialized { .. } | DashError::Config(_))
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            DashError::NotInitialized { .. } => "not_initialized",
            DashError::UnknownTopic { .. } => "unknown_topic",
            DashError::ShuttingDown(_) => "shutting_down",
            DashError::ProbeUnavailable(_) => "probe_unavailable",
            DashError::Collect(_) => "collect_failed",
            DashError::CollectTimeout { .. } => "collect_timeout",
            DashError::Transport(_) => "transport",
            DashError::Config(_) => "config",
            DashError::Io(_) => "io",
            DashError::Serialization(_) => "serialization",
        }
    }
}

pub type DashResult<T> = Result<T, DashError>;

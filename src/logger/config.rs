/// Runtime logger configuration
///
/// Set once from the parsed command line and read on every log call.
use super::levels::LogLevel;
use super::tags::LogTag;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    /// Debug keys enabled via `--debug-<tag>`
    pub debug_tags: HashSet<String>,
    pub debug_all: bool,
    /// Suppress everything below Warning
    pub quiet: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            debug_all: false,
            quiet: false,
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

pub fn update_logger_config<F: FnOnce(&mut LoggerConfig)>(f: F) {
    let mut guard = LOGGER_CONFIG.write();
    f(&mut guard);
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    let config = LOGGER_CONFIG.read();
    config.debug_all || config.debug_tags.contains(&tag.to_debug_key())
}

//! Structured console logging
//!
//! ```rust,ignore
//! use hostdash::logger::{self, LogTag};
//!
//! logger::info(LogTag::Broadcast, "session 4 subscribed to host");
//! logger::debug(LogTag::Docker, "ping ok"); // only with --debug-docker
//! ```
//!
//! Call [`init`] once at startup, before the first log line.

mod config;
mod core;
mod format;
mod levels;
mod tags;

pub use config::{get_logger_config, set_logger_config, update_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

use crate::arguments::Arguments;

/// Configure filtering from the parsed command line
///
/// `config_level` is the `[logger] min_level` value; CLI flags win over it.
pub fn init(args: &Arguments, config_level: Option<&str>) {
    let mut config = LoggerConfig::default();

    if let Some(level) = config_level.and_then(LogLevel::from_str) {
        config.min_level = level;
    }
    if args.verbose {
        config.min_level = LogLevel::Verbose;
    }
    config.quiet = args.quiet;
    config.debug_all = args.debug_all;
    config.debug_tags = args.enabled_debug_keys().into_iter().collect();

    set_logger_config(config);
}

pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Shown only with `--debug-<tag>` or `--debug-all`
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Shown only with `--verbose`
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Whether a debug line for `tag` would be displayed
///
/// Lets callers skip building expensive debug strings.
pub fn is_debug_enabled(tag: &LogTag) -> bool {
    core::should_log(tag, LogLevel::Debug)
}

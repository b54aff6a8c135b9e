/// Filtering rules applied before anything is formatted
use super::config::{get_logger_config, is_debug_enabled_for_tag};
use super::levels::LogLevel;
use super::tags::LogTag;

/// Decide whether a message is displayed
///
/// 1. Errors are always shown
/// 2. `quiet` hides everything below Warning
/// 3. Debug requires `--debug-<tag>` or `--debug-all`
/// 4. Verbose requires `--verbose`
/// 5. Otherwise compare against the minimum threshold
pub fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    let config = get_logger_config();

    if level == LogLevel::Error {
        return true;
    }

    if config.quiet && level > LogLevel::Warning {
        return false;
    }

    match level {
        LogLevel::Debug => is_debug_enabled_for_tag(tag) || config.min_level >= LogLevel::Verbose,
        LogLevel::Verbose => config.min_level == LogLevel::Verbose,
        _ => level <= config.min_level,
    }
}

pub fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }
    super::format::format_and_log(&tag, level, message);
}

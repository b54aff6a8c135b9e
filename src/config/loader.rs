/// Loading, validating and overriding configuration
use super::schemas::Config;
use crate::arguments::Arguments;
use crate::errors::{DashError, DashResult};
use crate::logger::{self, LogTag};
use std::path::Path;

/// Used when no `--config` is given
pub const DEFAULT_CONFIG_PATH: &str = "hostdash.toml";

/// Read a TOML file, falling back to defaults when it does not exist
pub fn load_config_from_path(path: &Path) -> DashResult<Config> {
    if !path.exists() {
        logger::warning(
            LogTag::Config,
            &format!("Config file '{}' not found, using default values", path.display()),
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        DashError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    parse_config(&contents)
        .map_err(|e| DashError::Config(format!("'{}': {}", path.display(), e)))
}

pub fn parse_config(contents: &str) -> DashResult<Config> {
    let mut config = toml::from_str::<Config>(contents)
        .map_err(|e| DashError::Config(format!("Failed to parse config: {}", e)))?;
    config.modules = config
        .modules
        .into_iter()
        .map(|(name, module)| (name.to_lowercase(), module))
        .collect();
    validate(&config)?;
    Ok(config)
}

/// Reject values that would make the core misbehave rather than fail loudly
pub fn validate(config: &Config) -> DashResult<()> {
    let mut problems = Vec::new();

    if config.scheduler.poll_interval_secs == 0 {
        problems.push("scheduler.poll_interval_secs must be greater than 0".to_string());
    }
    if config.scheduler.collect_timeout_secs == 0 {
        problems.push("scheduler.collect_timeout_secs must be greater than 0".to_string());
    }
    if config.broadcast.session_queue_capacity == 0 {
        problems.push("broadcast.session_queue_capacity must be greater than 0".to_string());
    }
    if config.broadcast.gc_interval_secs == 0 {
        problems.push("broadcast.gc_interval_secs must be greater than 0".to_string());
    }
    if config.webserver.ws_heartbeat_secs == 0 {
        problems.push("webserver.ws_heartbeat_secs must be greater than 0".to_string());
    }
    for (name, module) in &config.modules {
        if module.poll_interval_secs == Some(0) {
            problems.push(format!("modules.{}.poll_interval_secs must be greater than 0", name));
        }
    }
    if crate::logger::LogLevel::from_str(&config.logger.min_level).is_none() {
        problems.push(format!("logger.min_level '{}' is not a known level", config.logger.min_level));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(DashError::Config(problems.join("; ")))
    }
}

/// Command-line values win over the file
pub fn apply_overrides(config: &mut Config, args: &Arguments) {
    if let Some(host) = &args.host {
        config.webserver.host = host.clone();
    }
    if let Some(port) = args.port {
        config.webserver.port = port;
    }
    if let Some(secs) = args.poll_interval {
        config.scheduler.poll_interval_secs = secs.max(1);
    }
    for name in &args.disabled_modules {
        config
            .modules
            .entry(name.to_lowercase())
            .or_default()
            .enabled = false;
    }
}

/// Resolve the path, load, apply CLI overrides and validate the result
pub fn load(args: &Arguments) -> DashResult<Config> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH).to_path_buf());

    let mut config = load_config_from_path(&path)?;
    apply_overrides(&mut config, args);
    validate(&config)?;

    logger::debug(
        LogTag::Config,
        &format!(
            "Loaded config: bind={}:{} poll={}s replay={}s queue={}",
            config.webserver.host,
            config.webserver.port,
            config.scheduler.poll_interval_secs,
            config.broadcast.replay_window_secs,
            config.broadcast.session_queue_capacity
        ),
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [webserver]
            port = 9100

            [modules.Docker]
            enabled = false

            [modules.host]
            poll_interval_secs = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.webserver.port, 9100);
        assert_eq!(config.webserver.host, "0.0.0.0");
        assert_eq!(config.broadcast.replay_window_secs, 300);
        assert_eq!(config.broadcast.gc_interval_secs, 60);
        assert!(!config.module("Docker").enabled);
        assert_eq!(config.module("host").poll_interval_secs, Some(1));
        assert!(config.module("units").enabled);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let err = parse_config("[broadcast]\nsession_queue_capacity = 0\n").unwrap_err();
        assert!(matches!(err, DashError::Config(msg) if msg.contains("session_queue_capacity")));

        let err = parse_config("[logger]\nmin_level = \"chatty\"\n").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 3);
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostdash.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[webserver]\nport = 7000\nhost = \"127.0.0.1\"").unwrap();

        let args = Arguments {
            config: Some(path),
            port: Some(7001),
            disabled_modules: vec!["Podman".to_string()],
            ..Default::default()
        };
        let config = load(&args).unwrap();
        assert_eq!(config.webserver.port, 7001);
        assert_eq!(config.webserver.host, "127.0.0.1");
        assert!(!config.module("podman").enabled);
    }
}

/// Command-line arguments for the hostdash binary
///
/// Values given here override the matching entries in the TOML config.
/// Debug flags follow the `--debug-<tag>` convention used by the logger.
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "hostdash")]
#[command(about = "Host monitoring dashboard with live SSE/WebSocket updates", long_about = None)]
pub struct Arguments {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Interface to bind the HTTP server to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind the HTTP server to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Default poll interval for every module, in seconds
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Disable a module by name (repeatable)
    #[arg(long = "disable", value_name = "MODULE")]
    pub disabled_modules: Vec<String>,

    #[arg(long)]
    pub debug_registry: bool,
    #[arg(long)]
    pub debug_scheduler: bool,
    #[arg(long)]
    pub debug_broadcast: bool,
    #[arg(long)]
    pub debug_session: bool,
    #[arg(long)]
    pub debug_webserver: bool,
    #[arg(long)]
    pub debug_host: bool,
    #[arg(long)]
    pub debug_docker: bool,
    #[arg(long)]
    pub debug_podman: bool,
    #[arg(long)]
    pub debug_units: bool,
    #[arg(long)]
    pub debug_config: bool,

    /// Enable debug output for every subsystem
    #[arg(long)]
    pub debug_all: bool,

    /// Show verbose trace output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Arguments {
    /// Debug keys switched on by individual `--debug-<tag>` flags
    pub fn enabled_debug_keys(&self) -> Vec<String> {
        [
            ("registry", self.debug_registry),
            ("scheduler", self.debug_scheduler),
            ("broadcast", self.debug_broadcast),
            ("session", self.debug_session),
            ("webserver", self.debug_webserver),
            ("host", self.debug_host),
            ("docker", self.debug_docker),
            ("podman", self.debug_podman),
            ("units", self.debug_units),
            ("config", self.debug_config),
        ]
        .into_iter()
        .filter(|(_, on)| *on)
        .map(|(key, _)| key.to_string())
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_debug_flags() {
        let args = Arguments::parse_from([
            "hostdash",
            "--port",
            "9000",
            "--debug-docker",
            "--debug-broadcast",
            "--disable",
            "podman",
            "--disable",
            "units",
        ]);
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.enabled_debug_keys(), vec!["broadcast", "docker"]);
        assert_eq!(args.disabled_modules, vec!["podman", "units"]);
        assert!(!args.verbose);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Arguments::try_parse_from(["hostdash", "--quiet", "--verbose"]);
        assert!(result.is_err());
    }
}

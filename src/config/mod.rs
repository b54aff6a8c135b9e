//! Configuration
//!
//! Loaded once at startup from TOML, overridden by CLI flags, then passed
//! explicitly to the components that need it. There is no global config.

pub mod loader;
pub mod macros;
pub mod schemas;

pub use loader::{apply_overrides, load, load_config_from_path, parse_config, validate, DEFAULT_CONFIG_PATH};
pub use schemas::{
    BroadcastConfig, Config, LoggerSection, ModuleConfig, SchedulerConfig, WebserverConfig,
};

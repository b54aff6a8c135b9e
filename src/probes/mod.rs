//! Concrete data sources
//!
//! Each probe implements [`Module`](crate::modules::Module); which ones
//! actually run is decided by the registry at startup.

pub mod docker;
pub mod engine;
pub mod host;
pub mod podman;
pub mod units;

pub use docker::DockerModule;
pub use host::HostModule;
pub use podman::PodmanModule;
pub use units::UnitsModule;

use crate::errors::DashResult;
use crate::modules::ModuleRegistry;
use std::sync::Arc;

/// Register every built-in probe, in display order
pub fn register_builtin(registry: &mut ModuleRegistry) -> DashResult<()> {
    registry.register(Arc::new(HostModule::new()));
    registry.register(Arc::new(DockerModule::from_env()?));
    registry.register(Arc::new(PodmanModule::from_env()?));
    registry.register(Arc::new(UnitsModule::new()));
    Ok(())
}

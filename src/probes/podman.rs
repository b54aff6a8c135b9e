/// Podman containers and images via its Docker-compatible API
use super::engine::EngineClient;
use crate::errors::DashResult;
use crate::logger::{self, LogTag};
use crate::modules::{CollectContext, Module, Sample};
use async_trait::async_trait;
use std::path::PathBuf;

pub const PODMAN_TOPIC: &str = "podman";
const SYSTEM_SOCKET: &str = "/run/podman/podman.sock";

pub struct PodmanModule {
    client: EngineClient,
}

impl PodmanModule {
    pub fn new(client: EngineClient) -> Self {
        Self { client }
    }

    /// Rootless socket under `$XDG_RUNTIME_DIR` if present, else the system one
    pub fn from_env() -> DashResult<Self> {
        let socket = std::env::var_os("XDG_RUNTIME_DIR")
            .map(|dir| PathBuf::from(dir).join("podman/podman.sock"))
            .filter(|p| p.exists())
            .unwrap_or_else(|| PathBuf::from(SYSTEM_SOCKET));
        Ok(Self::new(EngineClient::new(socket)?))
    }
}

#[async_trait]
impl Module for PodmanModule {
    fn name(&self) -> &'static str {
        "Podman"
    }

    fn route_root(&self) -> &'static str {
        "virt/podman"
    }

    fn topics(&self) -> Vec<&'static str> {
        vec![PODMAN_TOPIC]
    }

    async fn should_enable(&self) -> DashResult<bool> {
        self.client.ping().await?;
        logger::debug(
            LogTag::Podman,
            &format!("Engine reachable at {}", self.client.socket().display()),
        );
        Ok(true)
    }

    async fn collect(&self, ctx: &CollectContext) -> DashResult<Vec<Sample>> {
        self.client.collect_inventory(PODMAN_TOPIC, ctx).await
    }
}

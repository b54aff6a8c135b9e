/// Docker containers and images
use super::engine::EngineClient;
use crate::errors::DashResult;
use crate::logger::{self, LogTag};
use crate::modules::{CollectContext, Module, Sample};
use async_trait::async_trait;
use std::path::PathBuf;

pub const DOCKER_TOPIC: &str = "docker";
const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

pub struct DockerModule {
    client: EngineClient,
}

impl DockerModule {
    pub fn new(client: EngineClient) -> Self {
        Self { client }
    }

    /// Honour `DOCKER_HOST=unix://...`; other schemes fall back to the default socket
    pub fn from_env() -> DashResult<Self> {
        Ok(Self::new(EngineClient::new(socket_from_docker_host(
            std::env::var("DOCKER_HOST").ok().as_deref(),
        ))?))
    }
}

fn socket_from_docker_host(value: Option<&str>) -> PathBuf {
    match value.and_then(|v| v.strip_prefix("unix://")) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_SOCKET),
    }
}

#[async_trait]
impl Module for DockerModule {
    fn name(&self) -> &'static str {
        "Docker"
    }

    fn route_root(&self) -> &'static str {
        "virt/docker"
    }

    fn topics(&self) -> Vec<&'static str> {
        vec![DOCKER_TOPIC]
    }

    async fn should_enable(&self) -> DashResult<bool> {
        self.client.ping().await?;
        logger::debug(
            LogTag::Docker,
            &format!("Engine reachable at {}", self.client.socket().display()),
        );
        Ok(true)
    }

    async fn collect(&self, ctx: &CollectContext) -> DashResult<Vec<Sample>> {
        self.client.collect_inventory(DOCKER_TOPIC, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_from_docker_host() {
        assert_eq!(socket_from_docker_host(None), PathBuf::from(DEFAULT_SOCKET));
        assert_eq!(
            socket_from_docker_host(Some("unix:///run/user/1000/docker.sock")),
            PathBuf::from("/run/user/1000/docker.sock")
        );
        assert_eq!(socket_from_docker_host(Some("tcp://10.0.0.1:2375")), PathBuf::from(DEFAULT_SOCKET));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_docker_module_collects_inventory() {
        use std::time::Duration;
        use tokio_util::sync::CancellationToken;

        let dir = tempfile::tempdir().unwrap();
        let socket = crate::probes::engine::tests::fake_engine(dir.path()).await;
        let module = DockerModule::new(EngineClient::new(socket).unwrap());

        assert!(module.should_enable().await.unwrap());

        let ctx = CollectContext::new(CancellationToken::new(), Duration::from_secs(5), 1);
        let samples = module.collect(&ctx).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].kind, "containers");
        assert_eq!(samples[0].payload[0]["Id"], "new");
        assert_eq!(samples[1].kind, "images");
    }

    #[tokio::test]
    async fn test_unreachable_engine_fails_probe() {
        let dir = tempfile::tempdir().unwrap();
        let module = DockerModule::new(EngineClient::new(dir.path().join("docker.sock")).unwrap());
        assert!(module.should_enable().await.is_err());
    }
}

/// Client for the Docker Engine API over a Unix socket
///
/// Podman serves the same API, so both probes share this client. HTTP is
/// handled by reqwest with every request routed to the socket; the host
/// part of the URL is ignored by the daemon.
use crate::errors::{DashError, DashResult};
use crate::modules::{CollectContext, Sample};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const ENGINE_BASE_URL: &str = "http://localhost";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct EngineClient {
    socket: PathBuf,
    timeout: Duration,
    http: reqwest::Client,
}

impl EngineClient {
    pub fn new(socket: impl Into<PathBuf>) -> DashResult<Self> {
        Self::with_timeout(socket, REQUEST_TIMEOUT)
    }

    /// `timeout` bounds each request, connect included
    pub fn with_timeout(socket: impl Into<PathBuf>, timeout: Duration) -> DashResult<Self> {
        let socket = socket.into();
        let builder = reqwest::Client::builder().timeout(timeout);
        #[cfg(unix)]
        let builder = builder.unix_socket(socket.clone());

        let http = builder
            .build()
            .map_err(|e| DashError::Transport(format!("engine client for {}: {}", socket.display(), e)))?;

        Ok(Self {
            socket,
            timeout,
            http,
        })
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    #[cfg(unix)]
    async fn get(&self, path: &str) -> DashResult<reqwest::Response> {
        self.http
            .get(format!("{}{}", ENGINE_BASE_URL, path))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.request_error(path, e))
    }

    #[cfg(not(unix))]
    async fn get(&self, _path: &str) -> DashResult<reqwest::Response> {
        Err(DashError::ProbeUnavailable(
            "container engine sockets require a Unix host".to_string(),
        ))
    }

    fn request_error(&self, path: &str, e: reqwest::Error) -> DashError {
        if e.is_timeout() {
            DashError::CollectTimeout {
                millis: self.timeout.as_millis() as u64,
            }
        } else if e.is_decode() {
            DashError::Collect(format!("{} returned an unexpected body: {}", path, e))
        } else {
            DashError::Transport(format!("{} {}: {}", self.socket.display(), path, e))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> DashResult<T> {
        let response = self.get(path).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DashError::Collect(format!(
                "{} returned HTTP {}: {}",
                path,
                status.as_u16(),
                body.trim()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| self.request_error(path, e))
    }

    pub async fn ping(&self) -> DashResult<()> {
        let response = self.get("/_ping").await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.request_error("/_ping", e))?;

        if status.is_success() && body.trim() == "OK" {
            Ok(())
        } else {
            Err(DashError::ProbeUnavailable(format!(
                "engine at {} answered ping with HTTP {}",
                self.socket.display(),
                status.as_u16()
            )))
        }
    }

    /// All containers, newest first
    pub async fn containers(&self) -> DashResult<Vec<ContainerSummary>> {
        let mut containers: Vec<ContainerSummary> = self.get_json("/containers/json?all=1").await?;
        containers.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(containers)
    }

    /// All images, newest first
    pub async fn images(&self) -> DashResult<Vec<ImageSummary>> {
        let mut images: Vec<ImageSummary> = self.get_json("/images/json").await?;
        images.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(images)
    }

    /// `containers` and `images` samples for `topic`
    pub async fn collect_inventory(&self, topic: &str, ctx: &CollectContext) -> DashResult<Vec<Sample>> {
        let containers = self.containers().await?;
        if ctx.is_cancelled() {
            return Err(DashError::Collect("cancelled".to_string()));
        }
        let images = self.images().await?;
        Ok(vec![
            Sample::new(topic, "containers", containers)?,
            Sample::new(topic, "images", images)?,
        ])
    }
}

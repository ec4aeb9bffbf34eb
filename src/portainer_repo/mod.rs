// Portainer-compatible control-plane client over reqwest

mod parse;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Url};

use crate::config::PortainerConfig;
use crate::models::{Container, Endpoint, EndpointId, Stack, StatsSample};

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("control plane request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("control plane returned {status} for {path}")]
    Status { status: u16, path: String },
    #[error("control plane response for {path} did not decode: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Container lifecycle actions the control plane accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAction {
    Start,
    Stop,
}

impl StackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackAction::Start => "start",
            StackAction::Stop => "stop",
        }
    }
}

/// Read and control surface of the container management control plane.
/// Every call fails with a typed error, never an empty collection.
pub trait ControlPlane: Send + Sync + 'static {
    fn list_endpoints(&self) -> impl Future<Output = Result<Vec<Endpoint>, ApiError>> + Send;

    fn list_stacks(
        &self,
        endpoint_id: EndpointId,
    ) -> impl Future<Output = Result<Vec<Stack>, ApiError>> + Send;

    fn list_containers(
        &self,
        endpoint_id: EndpointId,
    ) -> impl Future<Output = Result<Vec<Container>, ApiError>> + Send;

    fn container_stats(
        &self,
        endpoint_id: EndpointId,
        raw_id: &str,
    ) -> impl Future<Output = Result<StatsSample, ApiError>> + Send;

    fn container_action(
        &self,
        endpoint_id: EndpointId,
        raw_id: &str,
        action: ContainerAction,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn stack_action(
        &self,
        endpoint_id: EndpointId,
        stack_id: i64,
        action: StackAction,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Whether the most recent call succeeded. Used for diagnostics only.
    fn connected(&self) -> bool {
        true
    }
}

pub struct PortainerRepo {
    http: Client,
    base: Url,
    connected: AtomicBool,
}

impl PortainerRepo {
    pub fn new(config: &PortainerConfig) -> anyhow::Result<Self> {
        let mut base = Url::parse(&config.url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&config.api_key)?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        Ok(Self {
            http,
            base,
            connected: AtomicBool::new(false),
        })
    }

    /// The base url always carries a trailing slash, so concatenation with a
    /// relative path yields a well-formed url.
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn request_bytes(&self, path: &str, query: &[(&str, String)]) -> Result<Bytes, ApiError> {
        let resp = self.http.get(self.url(path)).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(resp.bytes().await?)
    }

    /// List fetches drive the connected flag. Stats and action calls go
    /// through the untracked paths: a stopped container routinely answers
    /// 404 on stats, which says nothing about reachability.
    async fn get_bytes(&self, path: &str, query: &[(&str, String)]) -> Result<Bytes, ApiError> {
        let result = self.request_bytes(path, query).await;
        self.connected.store(result.is_ok(), Ordering::Relaxed);
        result
    }

    async fn post_empty(&self, path: &str, query: &[(&str, String)]) -> Result<(), ApiError> {
        let resp = self.http.post(self.url(path)).query(query).send().await?;
        let status = resp.status();
        // 304 means the container was already in the requested state.
        if !status.is_success() && status.as_u16() != 304 {
            return Err(ApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

impl ControlPlane for PortainerRepo {
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>, ApiError> {
        let path = "api/endpoints";
        let body = self.get_bytes(path, &[]).await?;
        parse::endpoints(&body).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn list_stacks(&self, endpoint_id: EndpointId) -> Result<Vec<Stack>, ApiError> {
        let path = "api/stacks";
        let filters = format!("{{\"EndpointID\":{endpoint_id}}}");
        let body = self.get_bytes(path, &[("filters", filters)]).await?;
        let stacks = parse::stacks(&body).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })?;
        // Some control-plane versions ignore the filter; drop foreign entries.
        Ok(stacks
            .into_iter()
            .filter(|s| s.endpoint_id == endpoint_id)
            .collect())
    }

    async fn list_containers(&self, endpoint_id: EndpointId) -> Result<Vec<Container>, ApiError> {
        let path = format!("api/endpoints/{endpoint_id}/docker/containers/json");
        let body = self
            .get_bytes(&path, &[("all", "true".to_string())])
            .await?;
        parse::containers(endpoint_id, &body).map_err(|source| ApiError::Decode { path, source })
    }

    async fn container_stats(
        &self,
        endpoint_id: EndpointId,
        raw_id: &str,
    ) -> Result<StatsSample, ApiError> {
        let path = format!("api/endpoints/{endpoint_id}/docker/containers/{raw_id}/stats");
        let body = self
            .request_bytes(&path, &[("stream", "false".to_string())])
            .await?;
        parse::stats_sample(&body).map_err(|source| ApiError::Decode { path, source })
    }

    async fn container_action(
        &self,
        endpoint_id: EndpointId,
        raw_id: &str,
        action: ContainerAction,
    ) -> Result<(), ApiError> {
        let path = format!(
            "api/endpoints/{endpoint_id}/docker/containers/{raw_id}/{}",
            action.as_str()
        );
        self.post_empty(&path, &[]).await
    }

    async fn stack_action(
        &self,
        endpoint_id: EndpointId,
        stack_id: i64,
        action: StackAction,
    ) -> Result<(), ApiError> {
        let path = format!("api/stacks/{stack_id}/{}", action.as_str());
        self.post_empty(&path, &[("endpointId", endpoint_id.to_string())])
            .await
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

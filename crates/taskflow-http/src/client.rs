use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use taskflow_core::{
    CoreError, Edge, EdgeId, GraphId, GraphPersistence, Node, NodeId, NodeUpdate,
    PersistenceConfig, TaskId, TaskPatch, TaskPayload,
};

/// Configuration for the HTTP persistence adapter
#[derive(Debug, Clone, PartialEq)]
pub struct HttpPersistenceConfig {
    /// Base URL of the taskflow API, without the `/api` prefix
    pub base_url: String,
    /// Timeout in seconds for HTTP requests
    pub timeout_secs: u64,
    /// Bearer token sent with every request
    pub api_token: Option<String>,
}

impl Default for HttpPersistenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 30,
            api_token: None,
        }
    }
}

impl TryFrom<&PersistenceConfig> for HttpPersistenceConfig {
    type Error = CoreError;

    fn try_from(config: &PersistenceConfig) -> Result<Self, Self::Error> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            CoreError::ConfigurationError("http persistence requires base_url".to_string())
        })?;

        Ok(Self {
            base_url,
            timeout_secs: config.timeout_secs,
            api_token: config.api_token.clone(),
        })
    }
}

/// `GraphPersistence` over the taskflow REST API
#[derive(Debug, Clone)]
pub struct HttpGraphPersistence {
    config: HttpPersistenceConfig,
    base_url: Url,
    client: Client,
}

/// API response wrapper
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteEdgesRequest<'a> {
    ids: &'a [EdgeId],
}

impl HttpGraphPersistence {
    /// Creates a new adapter with the provided configuration
    pub fn new(config: HttpPersistenceConfig) -> Result<Self, CoreError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            CoreError::ConfigurationError(format!("Invalid base URL {}: {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CoreError::ConfigurationError(format!(
                "Base URL {} cannot carry a path",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::ConfigurationError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    /// Creates a new adapter with the provided base URL and timeout
    pub fn with_url_and_timeout(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, CoreError> {
        Self::new(HttpPersistenceConfig {
            base_url: base_url.into(),
            timeout_secs,
            api_token: None,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &HttpPersistenceConfig {
        &self.config
    }

    /// `{base}/api/taskflows/{graph}/{tail..}` with every segment percent-encoded
    fn url(&self, graph_id: &GraphId, tail: &[&str]) -> Result<Url, CoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CoreError::ConfigurationError(format!(
                    "Base URL {} cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["api", "taskflows", graph_id.as_str()])
            .extend(tail);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Maps a transport error to a CoreError
    fn map_http_error(&self, error: reqwest::Error) -> CoreError {
        if error.is_timeout() {
            CoreError::CommunicationError(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            CoreError::CommunicationError(format!("Connection error: {}", error))
        } else {
            CoreError::CommunicationError(format!("HTTP error: {}", error))
        }
    }

    async fn send(&self, builder: RequestBuilder, resource: &str) -> Result<Response, CoreError> {
        let response = builder.send().await.map_err(|e| self.map_http_error(e))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => {
                warn!(resource, "Resource not found");
                Err(CoreError::NotFound(resource.to_string()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                    .ok()
                    .and_then(|envelope| envelope.error)
                    .unwrap_or(body);
                warn!(resource, status = status.as_u16(), "Persistence request rejected");
                Err(CoreError::PersistenceError(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    message
                )))
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        resource: &str,
    ) -> Result<T, CoreError> {
        let response = self.send(builder, resource).await?;
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| CoreError::SerializationError(format!("Failed to parse response: {}", e)))?;

        match envelope {
            ApiResponse { data: Some(data), .. } => Ok(data),
            ApiResponse { error: Some(error), .. } => Err(CoreError::PersistenceError(error)),
            _ => Err(CoreError::PersistenceError(format!(
                "Empty response for {}",
                resource
            ))),
        }
    }
}

#[async_trait]
impl GraphPersistence for HttpGraphPersistence {
    #[instrument(skip(self), fields(graph_id = %graph_id))]
    async fn fetch_nodes(&self, graph_id: &GraphId) -> Result<Vec<Node>, CoreError> {
        let url = self.url(graph_id, &["nodes"])?;
        let nodes: Vec<Node> = self
            .send_json(self.request(Method::GET, url), &format!("Taskflow {}", graph_id))
            .await?;
        debug!(count = nodes.len(), "Fetched nodes");
        Ok(nodes)
    }

    #[instrument(skip(self), fields(graph_id = %graph_id))]
    async fn fetch_edges(&self, graph_id: &GraphId) -> Result<Vec<Edge>, CoreError> {
        let url = self.url(graph_id, &["edges"])?;
        let edges: Vec<Edge> = self
            .send_json(self.request(Method::GET, url), &format!("Taskflow {}", graph_id))
            .await?;
        debug!(count = edges.len(), "Fetched edges");
        Ok(edges)
    }

    #[instrument(skip(self, node), fields(graph_id = %graph_id, node_id = %node.id))]
    async fn create_node(&self, graph_id: &GraphId, node: &Node) -> Result<Node, CoreError> {
        let url = self.url(graph_id, &["nodes"])?;
        self.send_json(
            self.request(Method::POST, url).json(node),
            &format!("Taskflow {}", graph_id),
        )
        .await
    }

    #[instrument(skip(self, update), fields(graph_id = %graph_id, node_id = %node_id))]
    async fn update_node(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        update: &NodeUpdate,
    ) -> Result<Node, CoreError> {
        let url = self.url(graph_id, &["nodes", node_id.as_str()])?;
        self.send_json(
            self.request(Method::PATCH, url).json(update),
            &format!("Node {}", node_id),
        )
        .await
    }

    #[instrument(skip(self), fields(graph_id = %graph_id, node_id = %node_id))]
    async fn delete_node(&self, graph_id: &GraphId, node_id: &NodeId) -> Result<(), CoreError> {
        let url = self.url(graph_id, &["nodes", node_id.as_str()])?;
        self.send(self.request(Method::DELETE, url), &format!("Node {}", node_id))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, edge), fields(graph_id = %graph_id, edge_id = %edge.id))]
    async fn create_edge(&self, graph_id: &GraphId, edge: &Edge) -> Result<Edge, CoreError> {
        let url = self.url(graph_id, &["edges"])?;
        self.send_json(
            self.request(Method::POST, url).json(edge),
            &format!("Taskflow {}", graph_id),
        )
        .await
    }

    #[instrument(skip(self, edges), fields(graph_id = %graph_id, count = edges.len()))]
    async fn create_edges_bulk(
        &self,
        graph_id: &GraphId,
        edges: &[Edge],
    ) -> Result<Vec<Edge>, CoreError> {
        let url = self.url(graph_id, &["edges", "bulk"])?;
        self.send_json(
            self.request(Method::POST, url).json(edges),
            &format!("Taskflow {}", graph_id),
        )
        .await
    }

    #[instrument(skip(self, edge_ids), fields(graph_id = %graph_id, count = edge_ids.len()))]
    async fn delete_edges(&self, graph_id: &GraphId, edge_ids: &[EdgeId]) -> Result<(), CoreError> {
        let url = self.url(graph_id, &["edges"])?;
        self.send(
            self.request(Method::DELETE, url)
                .json(&DeleteEdgesRequest { ids: edge_ids }),
            &format!("Taskflow {}", graph_id),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, patch), fields(graph_id = %graph_id, task_id = %task_id))]
    async fn update_task(
        &self,
        graph_id: &GraphId,
        task_id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<TaskPayload, CoreError> {
        let url = self.url(graph_id, &["tasks", task_id.as_str()])?;
        self.send_json(
            self.request(Method::PATCH, url).json(patch),
            &format!("Task {}", task_id),
        )
        .await
    }
}

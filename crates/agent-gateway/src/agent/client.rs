//! HTTP client for agent discovery endpoints.

use reqwest::{Client, Url};
use serde_json::Value;

use super::error::{AgentClientError, AgentClientResult};
use crate::context::RequestContext;

/// Client for the namespace and service discovery API exposed by agents.
///
/// Shares the proxy transport, so the same TLS policy applies to both.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: Client,
}

impl HttpAgentClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// List the namespaces visible to the agent.
    pub async fn get_namespaces(
        &self,
        ctx: &RequestContext,
        agent_url: &str,
    ) -> AgentClientResult<Value> {
        let url = endpoint(agent_url, &["api", "v1", "namespaces"])?;
        self.get_json(ctx, url).await
    }

    /// List the service names deployed in a namespace.
    pub async fn list_service_names(
        &self,
        ctx: &RequestContext,
        agent_url: &str,
        namespace: &str,
    ) -> AgentClientResult<Value> {
        let url = endpoint(
            agent_url,
            &["api", "v1", "namespaces", namespace, "serviceNames"],
        )?;
        self.get_json(ctx, url).await
    }

    async fn get_json(&self, ctx: &RequestContext, url: Url) -> AgentClientResult<Value> {
        let response = ctx.apply(self.client.get(url.clone())).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| AgentClientError::ParseError(format!("Failed to parse response: {}", e)))
    }
}

/// Append path segments to the agent base URL, percent-encoding each one.
fn endpoint(agent_url: &str, segments: &[&str]) -> AgentClientResult<Url> {
    let invalid = |message: String| AgentClientError::InvalidUrl {
        url: agent_url.to_string(),
        message,
    };

    let mut url = Url::parse(agent_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("URL cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

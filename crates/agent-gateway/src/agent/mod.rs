//! Agent domain: wire models, the registry contract and the agent client.

mod client;
mod error;
mod models;
mod registry;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;

pub use client::HttpAgentClient;
pub use error::{AgentClientError, AgentClientResult};
pub use models::*;
pub use registry::{
    AgentRegistry, InMemoryAgentRegistry, RegistryError, RegistryResult, check_compatibility,
    parse_agent_version,
};

/// Calls made against a registered agent, abstracted for testability.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn get_namespaces(&self, ctx: &RequestContext, agent_url: &str)
    -> AgentClientResult<Value>;

    async fn list_service_names(
        &self,
        ctx: &RequestContext,
        agent_url: &str,
        namespace: &str,
    ) -> AgentClientResult<Value>;
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn get_namespaces(
        &self,
        ctx: &RequestContext,
        agent_url: &str,
    ) -> AgentClientResult<Value> {
        self.get_namespaces(ctx, agent_url).await
    }

    async fn list_service_names(
        &self,
        ctx: &RequestContext,
        agent_url: &str,
        namespace: &str,
    ) -> AgentClientResult<Value> {
        self.list_service_names(ctx, agent_url, namespace).await
    }
}

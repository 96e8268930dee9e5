//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, redirect};

use crate::agent::{AgentClient, AgentRegistry};
use crate::allowlist::{AllowListPolicy, SystemInfo};
use crate::gate::AgentGate;

/// Transport settings for the outbound proxy client.
#[derive(Clone, Debug)]
pub struct ProxyClientConfig {
    /// Skip upstream certificate verification. Agents commonly present
    /// self-signed certificates, so this defaults to `true`.
    pub insecure_skip_verify: bool,
    /// TCP connect timeout for upstream connections.
    pub connect_timeout: Duration,
}

impl Default for ProxyClientConfig {
    fn default() -> Self {
        Self {
            insecure_skip_verify: true,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Build the HTTP client shared by the proxy and the agent client.
///
/// Redirects are not followed so callers observe upstream 3xx responses.
pub fn build_http_client(config: &ProxyClientConfig) -> reqwest::Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(config.insecure_skip_verify)
        .connect_timeout(config.connect_timeout)
        .redirect(redirect::Policy::none())
        .build()
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Agent registration store.
    pub registry: Arc<dyn AgentRegistry>,
    /// Liveness and compatibility gate in front of the registry.
    pub gate: AgentGate,
    /// Upstream host policy.
    pub allow_list: AllowListPolicy,
    /// Client for agent discovery endpoints.
    pub agent_client: Arc<dyn AgentClient>,
    /// HTTP client for proxying requests upstream.
    pub http_client: Client,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        agent_client: Arc<dyn AgentClient>,
        system_info: Arc<dyn SystemInfo>,
        http_client: Client,
    ) -> Self {
        Self {
            gate: AgentGate::new(registry.clone()),
            registry,
            allow_list: AllowListPolicy::new(system_info),
            agent_client,
            http_client,
        }
    }
}

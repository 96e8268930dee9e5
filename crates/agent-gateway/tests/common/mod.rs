//! Test utilities and common setup.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_gateway::agent::{
    AgentClient, AgentClientError, AgentClientResult, AgentRecord, AgentRegistry, AgentStatus,
    InMemoryAgentRegistry, KeepaliveMessage, RegistryError, RegistryResult,
};
use agent_gateway::allowlist::StaticSystemInfo;
use agent_gateway::api::{self, AppState, ProxyClientConfig};
use agent_gateway::context::RequestContext;
use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Version the test registries expect from agents.
pub const EXPECTED_VERSION: semver::Version = semver::Version::new(1, 2, 0);

/// Registry returning fixed records, or failing every lookup.
#[derive(Default)]
pub struct FixtureRegistry {
    records: Mutex<HashMap<String, AgentRecord>>,
    unavailable: bool,
}

impl FixtureRegistry {
    pub fn with(records: Vec<AgentRecord>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|record| (record.agent_id.clone(), record))
                    .collect(),
            ),
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            records: Mutex::default(),
            unavailable: true,
        }
    }

    fn check(&self) -> RegistryResult<()> {
        if self.unavailable {
            Err(RegistryError::Unavailable("registry offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AgentRegistry for FixtureRegistry {
    async fn process_keepalive(&self, _message: KeepaliveMessage) -> RegistryResult<String> {
        self.check()?;
        Ok(EXPECTED_VERSION.to_string())
    }

    async fn list_agents(&self, _: bool, _: bool) -> RegistryResult<Vec<AgentRecord>> {
        self.check()?;
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn get_agent(&self, agent_id: &str) -> RegistryResult<Option<AgentRecord>> {
        self.check()?;
        Ok(self.records.lock().unwrap().get(agent_id).cloned())
    }
}

/// Agent client that records the calls it receives.
#[derive(Default)]
pub struct RecordingAgentClient {
    pub calls: Mutex<Vec<(String, String, Option<String>)>>,
    pub fail_with_status: Option<u16>,
}

#[async_trait]
impl AgentClient for RecordingAgentClient {
    async fn get_namespaces(
        &self,
        ctx: &RequestContext,
        agent_url: &str,
    ) -> AgentClientResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((ctx.request_id.clone(), agent_url.to_string(), None));
        if let Some(status) = self.fail_with_status {
            return Err(AgentClientError::Status {
                url: agent_url.to_string(),
                status,
                body: String::new(),
            });
        }
        Ok(json!({ "namespaces": ["billing", "payments"] }))
    }

    async fn list_service_names(
        &self,
        ctx: &RequestContext,
        agent_url: &str,
        namespace: &str,
    ) -> AgentClientResult<Value> {
        self.calls.lock().unwrap().push((
            ctx.request_id.clone(),
            agent_url.to_string(),
            Some(namespace.to_string()),
        ));
        Ok(json!({ "serviceNames": [format!("{namespace}-api")] }))
    }
}

/// Build application state over the given collaborators.
pub fn test_state(
    registry: Arc<dyn AgentRegistry>,
    agent_client: Arc<dyn AgentClient>,
    allowed_hosts: &[&str],
) -> AppState {
    let http_client = api::build_http_client(&ProxyClientConfig::default()).unwrap();
    let system_info = StaticSystemInfo::new(allowed_hosts.iter().map(|h| h.to_string()).collect());
    AppState::new(registry, agent_client, Arc::new(system_info), http_client)
}

/// Router backed by an in-memory registry that allows loopback upstreams.
pub fn test_app() -> (Router, Arc<InMemoryAgentRegistry>) {
    test_app_with_timeout(Duration::from_secs(60))
}

/// Like [`test_app`] with a custom keepalive timeout. `Duration::ZERO`
/// makes every agent inactive.
pub fn test_app_with_timeout(timeout: Duration) -> (Router, Arc<InMemoryAgentRegistry>) {
    let registry = Arc::new(InMemoryAgentRegistry::new(timeout, EXPECTED_VERSION));
    let state = test_state(
        registry.clone(),
        Arc::new(RecordingAgentClient::default()),
        &["127.0.0.1"],
    );
    (api::create_router(state), registry)
}

/// Router over a fixture registry and a recording agent client.
pub fn fixture_app(
    registry: FixtureRegistry,
    agent_client: Arc<RecordingAgentClient>,
    allowed_hosts: &[&str],
) -> Router {
    api::create_router(test_state(Arc::new(registry), agent_client, allowed_hosts))
}

/// A keepalive for an agent in the `prod` cloud.
pub fn keepalive(namespace: &str, url: &str, agent_version: &str) -> KeepaliveMessage {
    KeepaliveMessage {
        cloud: "prod".to_string(),
        namespace: namespace.to_string(),
        url: url.to_string(),
        backend_version: "2.4.0".to_string(),
        name: String::new(),
        agent_version: agent_version.to_string(),
    }
}

/// An active, compatible record for fixture registries.
pub fn active_record(agent_id: &str, agent_url: &str) -> AgentRecord {
    AgentRecord {
        agent_id: agent_id.to_string(),
        agent_deployment_cloud: "prod".to_string(),
        agent_namespace: "billing".to_string(),
        agent_url: agent_url.to_string(),
        backend_version: "2.4.0".to_string(),
        name: "billing".to_string(),
        agent_version: "1.2.0".to_string(),
        last_active: Utc::now(),
        status: AgentStatus::Active,
        compatibility_error: None,
    }
}

/// Serve a router on an ephemeral loopback port.
pub async fn spawn_upstream(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

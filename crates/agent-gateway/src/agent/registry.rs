//! Agent registry contract and the in-memory registry.
//!
//! The registry owns all agent state: keepalive bookkeeping, liveness
//! derivation and version compatibility. Handlers only read from it, apart
//! from handing over validated keepalives.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use semver::Version;
use thiserror::Error;
use tracing::{debug, info};

use super::models::{
    AgentRecord, AgentStatus, CompatibilityError, CompatibilitySeverity, KeepaliveMessage,
};

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised by a registry implementation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The backing store could not be reached.
    #[error("agent registry unavailable: {0}")]
    Unavailable(String),
}

/// Registry operations used by the API layer.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Record a keepalive and return the version token for the agent.
    async fn process_keepalive(&self, message: KeepaliveMessage) -> RegistryResult<String>;

    /// List agents, optionally hiding inactive and incompatible ones.
    async fn list_agents(
        &self,
        only_active: bool,
        show_incompatible: bool,
    ) -> RegistryResult<Vec<AgentRecord>>;

    /// Look up a single agent by id.
    async fn get_agent(&self, agent_id: &str) -> RegistryResult<Option<AgentRecord>>;
}

#[derive(Debug, Clone)]
struct AgentEntry {
    keepalive: KeepaliveMessage,
    last_active: DateTime<Utc>,
}

/// Process-local registry keyed by agent id.
///
/// Entries are never evicted: an agent that stops sending keepalives stays
/// listed as `Inactive`. The map is bounded by the number of distinct
/// `cloud_namespace` deployments that ever reported, and a restart clears it.
///
/// An agent is `Active` while its last keepalive is younger than the
/// keepalive timeout. Compatibility is derived from the reported agent
/// version against the expected version: a different major version blocks
/// traffic, an older minor/patch only warns.
pub struct InMemoryAgentRegistry {
    agents: DashMap<String, AgentEntry>,
    keepalive_timeout: Duration,
    expected_version: Version,
}

impl InMemoryAgentRegistry {
    pub fn new(keepalive_timeout: Duration, expected_version: Version) -> Self {
        Self {
            agents: DashMap::new(),
            keepalive_timeout,
            expected_version,
        }
    }

    /// Number of agents ever seen, active or not.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    fn status_at(&self, last_active: DateTime<Utc>, now: DateTime<Utc>) -> AgentStatus {
        let elapsed = (now - last_active).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.keepalive_timeout {
            AgentStatus::Active
        } else {
            AgentStatus::Inactive
        }
    }

    fn to_record(&self, agent_id: &str, entry: &AgentEntry, now: DateTime<Utc>) -> AgentRecord {
        let keepalive = &entry.keepalive;
        AgentRecord {
            agent_id: agent_id.to_string(),
            agent_deployment_cloud: keepalive.cloud.clone(),
            agent_namespace: keepalive.namespace.clone(),
            agent_url: keepalive.url.clone(),
            backend_version: keepalive.backend_version.clone(),
            name: keepalive.display_name().to_string(),
            agent_version: keepalive.agent_version.clone(),
            last_active: entry.last_active,
            status: self.status_at(entry.last_active, now),
            compatibility_error: check_compatibility(
                &keepalive.agent_version,
                &self.expected_version,
            ),
        }
    }
}

/// Compare an agent version against the version this backend expects.
///
/// An empty version yields no error here; callers treat it as unknown.
pub fn check_compatibility(agent_version: &str, expected: &Version) -> Option<CompatibilityError> {
    if agent_version.is_empty() {
        return None;
    }

    let version = match parse_agent_version(agent_version) {
        Ok(version) => version,
        Err(e) => {
            return Some(CompatibilityError {
                severity: CompatibilitySeverity::Error,
                message: format!(
                    "Agent version '{}' is not a valid version: {}",
                    agent_version, e
                ),
            });
        }
    };

    if version.major != expected.major {
        Some(CompatibilityError {
            severity: CompatibilitySeverity::Error,
            message: format!(
                "Agent version {} is incompatible with required version {}. Please update the agent.",
                version, expected
            ),
        })
    } else if version < *expected {
        Some(CompatibilityError {
            severity: CompatibilitySeverity::Warning,
            message: format!(
                "Agent version {} is older than recommended version {}",
                version, expected
            ),
        })
    } else {
        None
    }
}

/// Parse an agent-reported version, accepting a leading `v` and missing
/// minor or patch components (`"1.2"` is `1.2.0`, `"1"` is `1.0.0`).
pub fn parse_agent_version(raw: &str) -> Result<Version, semver::Error> {
    let trimmed = raw.trim().trim_start_matches('v');
    let core_end = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(core_end);
    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0{suffix}"),
        1 => format!("{core}.0{suffix}"),
        _ => trimmed.to_string(),
    };
    Version::parse(&padded)
}

fn is_incompatible(record: &AgentRecord) -> bool {
    record.agent_version.is_empty() || record.is_blocked()
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn process_keepalive(&self, message: KeepaliveMessage) -> RegistryResult<String> {
        let agent_id = message.agent_id();
        let now = Utc::now();
        let previous = self.agents.insert(
            agent_id.clone(),
            AgentEntry {
                keepalive: message,
                last_active: now,
            },
        );
        if previous.is_none() {
            info!(agent_id = %agent_id, "Registered new agent");
        } else {
            debug!(agent_id = %agent_id, "Agent keepalive");
        }
        Ok(self.expected_version.to_string())
    }

    async fn list_agents(
        &self,
        only_active: bool,
        show_incompatible: bool,
    ) -> RegistryResult<Vec<AgentRecord>> {
        let now = Utc::now();
        let mut agents: Vec<AgentRecord> = self
            .agents
            .iter()
            .map(|entry| self.to_record(entry.key(), entry.value(), now))
            .filter(|record| !only_active || record.status == AgentStatus::Active)
            .filter(|record| show_incompatible || !is_incompatible(record))
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn get_agent(&self, agent_id: &str) -> RegistryResult<Option<AgentRecord>> {
        let now = Utc::now();
        Ok(self
            .agents
            .get(agent_id)
            .map(|entry| self.to_record(agent_id, entry.value(), now)))
    }
}

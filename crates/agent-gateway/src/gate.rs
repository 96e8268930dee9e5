//! Agent gate: preconditions an agent must meet before traffic reaches it.
//!
//! Checks run strictly in order and the first failure wins:
//!
//! 1. registry lookup succeeds
//! 2. the agent exists
//! 3. the agent is active
//! 4. the agent reported a version
//! 5. no blocking compatibility error is recorded
//!
//! Later checks rely on fields validated by earlier ones, so the order is
//! part of the contract.

use std::sync::Arc;

use thiserror::Error;

use crate::agent::{AgentRecord, AgentRegistry, AgentStatus, RegistryError};

/// Reason an agent was refused by the gate.
#[derive(Debug, Error)]
pub enum GateFailure {
    #[error("failed to look up agent {agent_id}: {source}")]
    UpstreamRegistryError {
        agent_id: String,
        #[source]
        source: RegistryError,
    },

    #[error("Agent {0} not found")]
    AgentNotFound(String),

    #[error("Agent {0} is not active")]
    InactiveAgent(String),

    #[error("Agent {0} version is unknown or incompatible")]
    IncompatibleAgentVersion(String),

    /// Carries the registry's compatibility message verbatim.
    #[error("{message}")]
    CompatibilityBlocked { agent_id: String, message: String },
}

#[derive(Clone)]
pub struct AgentGate {
    registry: Arc<dyn AgentRegistry>,
}

impl AgentGate {
    pub fn new(registry: Arc<dyn AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve an agent id to a record that may receive traffic.
    pub async fn resolve(&self, agent_id: &str) -> Result<AgentRecord, GateFailure> {
        let record = self
            .registry
            .get_agent(agent_id)
            .await
            .map_err(|source| GateFailure::UpstreamRegistryError {
                agent_id: agent_id.to_string(),
                source,
            })?
            .ok_or_else(|| GateFailure::AgentNotFound(agent_id.to_string()))?;

        if record.status != AgentStatus::Active {
            return Err(GateFailure::InactiveAgent(agent_id.to_string()));
        }
        if record.agent_version.is_empty() {
            return Err(GateFailure::IncompatibleAgentVersion(agent_id.to_string()));
        }
        if record.is_blocked() {
            let message = record
                .compatibility_error
                .map(|compat| compat.message)
                .unwrap_or_default();
            return Err(GateFailure::CompatibilityBlocked {
                agent_id: agent_id.to_string(),
                message,
            });
        }

        Ok(record)
    }
}

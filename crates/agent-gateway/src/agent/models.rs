//! Agent data models.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Agent liveness status, derived by the registry from keepalives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Keepalive received within the liveness window.
    Active,
    /// Keepalive window elapsed.
    Inactive,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AgentStatus::Active),
            "inactive" => Ok(AgentStatus::Inactive),
            _ => Err(format!("unknown agent status: {}", s)),
        }
    }
}

/// Severity of a compatibility problem reported for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilitySeverity {
    Warning,
    /// Blocks all traffic to the agent.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityError {
    pub severity: CompatibilitySeverity,
    pub message: String,
}

/// A registered agent as seen by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub agent_id: String,
    pub agent_deployment_cloud: String,
    pub agent_namespace: String,
    /// Absolute URL (scheme + host[:port]) of the agent HTTP endpoint.
    pub agent_url: String,
    pub backend_version: String,
    pub name: String,
    /// Empty when the agent did not report a version.
    pub agent_version: String,
    pub last_active: DateTime<Utc>,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility_error: Option<CompatibilityError>,
}

impl AgentRecord {
    /// Whether the recorded compatibility problem forbids traffic.
    pub fn is_blocked(&self) -> bool {
        self.compatibility_error
            .as_ref()
            .is_some_and(|e| e.severity == CompatibilitySeverity::Error)
    }
}

/// Build the registry identifier for an agent deployment.
pub fn make_agent_id(cloud: &str, namespace: &str) -> String {
    format!("{}_{}", cloud, namespace).to_lowercase()
}

/// Keepalive payload posted periodically by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepaliveMessage {
    pub cloud: String,
    pub namespace: String,
    pub url: String,
    pub backend_version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub agent_version: String,
}

/// Keepalive schema violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeepaliveValidationError {
    #[error("required field '{0}' is empty")]
    MissingField(&'static str),

    #[error("invalid agent url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported agent url scheme '{0}', expected one of: http, https")]
    UnsupportedScheme(String),
}

impl KeepaliveMessage {
    /// Check required fields and the agent URL.
    pub fn validate(&self) -> Result<(), KeepaliveValidationError> {
        let required = [
            ("cloud", &self.cloud),
            ("namespace", &self.namespace),
            ("url", &self.url),
            ("backendVersion", &self.backend_version),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(KeepaliveValidationError::MissingField(field));
            }
        }

        let url = Url::parse(&self.url).map_err(|e| KeepaliveValidationError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(KeepaliveValidationError::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(KeepaliveValidationError::InvalidUrl {
                url: self.url.clone(),
                reason: "missing host".to_string(),
            });
        }
        Ok(())
    }

    pub fn agent_id(&self) -> String {
        make_agent_id(&self.cloud, &self.namespace)
    }

    /// Display name, falling back to the namespace.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.namespace
        } else {
            &self.name
        }
    }
}

/// Response to an accepted keepalive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
}

//! Unified API error handling with structured responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::agent::{AgentClientError, RegistryError};
use crate::gate::GateFailure;

/// API error type with structured responses.
///
/// Each variant maps to exactly one stable `code` in the response envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Agent {agent_id} not found")]
    AgentNotFound { agent_id: String },

    #[error("Agent {agent_id} is not active")]
    InactiveAgent { agent_id: String },

    #[error("Agent {agent_id} version is unknown or incompatible")]
    IncompatibleAgentVersion { agent_id: String },

    #[error("{message}")]
    CompatibilityBlocked { agent_id: String, message: String },

    #[error("Agent {agent_id} has an invalid url '{url}'")]
    InvalidAgentUrl {
        url: String,
        agent_id: String,
        debug: String,
    },

    #[error("Host '{host}' is not allowed")]
    HostNotAllowed { host: String },

    #[error("Failed to proxy the request to {url}")]
    ProxyFailed { url: String, debug: String },

    #[error("Failed to decode request body")]
    BadRequestBody { debug: String },

    #[error("Incorrect parameter type: '{param}' must be {expected}")]
    IncorrectParamType {
        param: String,
        expected: &'static str,
        debug: String,
    },

    #[error("Required parameters are missing: {params}")]
    RequiredParamsMissing { params: String },

    #[error("Invalid URL '{url}'")]
    InvalidUrl { url: String, debug: String },

    #[error("Internal server error")]
    Internal { debug: String },
}

impl ApiError {
    pub fn internal(debug: impl Into<String>) -> Self {
        Self::Internal {
            debug: debug.into(),
        }
    }

    pub fn bad_request_body(err: impl std::fmt::Display) -> Self {
        Self::BadRequestBody {
            debug: err.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AgentNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InactiveAgent { .. }
            | Self::IncompatibleAgentVersion { .. }
            | Self::CompatibilityBlocked { .. }
            | Self::InvalidAgentUrl { .. }
            | Self::ProxyFailed { .. } => StatusCode::FAILED_DEPENDENCY,
            Self::HostNotAllowed { .. }
            | Self::BadRequestBody { .. }
            | Self::IncorrectParamType { .. }
            | Self::RequiredParamsMissing { .. }
            | Self::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AgentNotFound { .. } => "AgentNotFound",
            Self::InactiveAgent { .. } => "InactiveAgent",
            Self::IncompatibleAgentVersion { .. } => "IncompatibleAgentVersion",
            Self::CompatibilityBlocked { .. } => "CompatibilityBlocked",
            Self::InvalidAgentUrl { .. } => "InvalidAgentUrl",
            Self::HostNotAllowed { .. } => "HostNotAllowed",
            Self::ProxyFailed { .. } => "ProxyFailed",
            Self::BadRequestBody { .. } => "BadRequestBody",
            Self::IncorrectParamType { .. } => "IncorrectParamType",
            Self::RequiredParamsMissing { .. } => "RequiredParamsMissing",
            Self::InvalidUrl { .. } => "InvalidURL",
            Self::Internal { .. } => "InternalServerError",
        }
    }

    fn params(&self) -> Option<Map<String, Value>> {
        let pairs: Vec<(&str, &str)> = match self {
            Self::AgentNotFound { agent_id }
            | Self::InactiveAgent { agent_id }
            | Self::IncompatibleAgentVersion { agent_id }
            | Self::CompatibilityBlocked { agent_id, .. } => vec![("agentId", agent_id.as_str())],
            Self::InvalidAgentUrl { url, agent_id, .. } => {
                vec![("url", url.as_str()), ("agentId", agent_id.as_str())]
            }
            Self::HostNotAllowed { host } => vec![("host", host.as_str())],
            Self::ProxyFailed { url, .. } | Self::InvalidUrl { url, .. } => {
                vec![("url", url.as_str())]
            }
            Self::IncorrectParamType {
                param, expected, ..
            } => vec![("param", param.as_str()), ("type", *expected)],
            Self::RequiredParamsMissing { params } => vec![("params", params.as_str())],
            Self::BadRequestBody { .. } | Self::Internal { .. } => return None,
        };

        Some(
            pairs
                .into_iter()
                .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                .collect(),
        )
    }

    fn debug_message(&self) -> Option<&str> {
        match self {
            Self::InvalidAgentUrl { debug, .. }
            | Self::ProxyFailed { debug, .. }
            | Self::BadRequestBody { debug }
            | Self::IncorrectParamType { debug, .. }
            | Self::InvalidUrl { debug, .. }
            | Self::Internal { debug } => Some(debug.as_str()),
            _ => None,
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            status: err.status_code().as_u16(),
            code: err.error_code(),
            message: err.to_string(),
            params: err.params(),
            debug: err.debug_message().map(str::to_string),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::from(&self);

        if status.is_server_error() {
            error!(error_code = body.code, message = %body.message, debug = ?body.debug, "API error");
        } else if status == StatusCode::FAILED_DEPENDENCY {
            warn!(error_code = body.code, message = %body.message, debug = ?body.debug, "Dependency error");
        } else {
            debug!(error_code = body.code, message = %body.message, "Client error");
        }

        (status, Json(body)).into_response()
    }
}

impl From<GateFailure> for ApiError {
    fn from(failure: GateFailure) -> Self {
        match failure {
            GateFailure::UpstreamRegistryError { agent_id, source } => ApiError::internal(
                format!("failed to look up agent {}: {}", agent_id, source),
            ),
            GateFailure::AgentNotFound(agent_id) => ApiError::AgentNotFound { agent_id },
            GateFailure::InactiveAgent(agent_id) => ApiError::InactiveAgent { agent_id },
            GateFailure::IncompatibleAgentVersion(agent_id) => {
                ApiError::IncompatibleAgentVersion { agent_id }
            }
            GateFailure::CompatibilityBlocked { agent_id, message } => {
                ApiError::CompatibilityBlocked { agent_id, message }
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<AgentClientError> for ApiError {
    fn from(err: AgentClientError) -> Self {
        ApiError::internal(err.to_string())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

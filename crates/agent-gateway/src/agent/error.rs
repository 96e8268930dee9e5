//! Agent client error types.

use thiserror::Error;

/// Result type for agent client operations.
pub type AgentClientResult<T> = Result<T, AgentClientError>;

/// Errors that can occur while calling an agent.
#[derive(Debug, Error)]
pub enum AgentClientError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The stored agent URL cannot be used as a base URL.
    #[error("Invalid agent URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// The agent answered with a non-success status.
    #[error("Agent at {url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

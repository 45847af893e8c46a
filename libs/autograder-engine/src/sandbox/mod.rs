pub mod breaker;
pub mod client;

pub use breaker::{BreakerSnapshot, BreakerStatus, CircuitBreaker};
pub use client::{classify_response, ExecuteRequest, HealthStatus, Package, Runtime, SandboxClient};

use autograder_common::ExecutionStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Grading service temporarily unavailable. Retry in {retry_in_secs}s")]
    Unavailable { retry_in_secs: u64 },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cannot connect to grading service: {0}")]
    Connect(String),

    #[error("Sandbox API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Execution error: invalid sandbox response: {0}")]
    Decode(String),

    #[error("Execution error: {0}")]
    Request(String),
}

impl SandboxError {
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            SandboxError::Timeout("sandbox did not respond in time".to_string())
        } else if error.is_connect() {
            SandboxError::Connect(error.to_string())
        } else if error.is_decode() {
            SandboxError::Decode(error.to_string())
        } else {
            SandboxError::Request(error.to_string())
        }
    }

    /// Whether this error should push the circuit breaker towards opening
    pub fn counts_as_failure(&self) -> bool {
        match self {
            SandboxError::Timeout(_) | SandboxError::Connect(_) => true,
            SandboxError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        match self {
            SandboxError::Unavailable { .. } => ExecutionStatus::ServiceUnavailable,
            SandboxError::Timeout(_) => ExecutionStatus::Timeout,
            SandboxError::Connect(_) => ExecutionStatus::ConnectionError,
            SandboxError::Status { .. } => ExecutionStatus::HttpError,
            SandboxError::Decode(_) | SandboxError::Request(_) => ExecutionStatus::InternalError,
        }
    }
}

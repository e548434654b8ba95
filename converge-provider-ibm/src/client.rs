//! Abstract IBM Cloud API client
//!
//! Resource adapters talk to the cloud through [`CloudClient`]. Service SDKs
//! (VPC, Kubernetes Service, Power Systems, ...) are wrapped behind it so the
//! wait machinery never sees SDK-specific error types.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors returned by a [`CloudClient`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The API answered with an error status
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The request never got an answer
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether retrying the same request may succeed (throttling, 5xx, network)
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Api { status, .. } => *status == 429 || *status >= 500,
            ClientError::Transport(_) => true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// CRUD access to one IBM Cloud resource collection
///
/// `path` is the collection path of the resource type (e.g. `/v1/vpcs`).
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Fetch a resource, returning `Ok(None)` if it does not exist
    async fn get(&self, path: &str, id: &str) -> ClientResult<Option<JsonValue>>;

    /// Create a resource and return the API's representation of it
    async fn create(&self, path: &str, body: JsonValue) -> ClientResult<JsonValue>;

    /// Apply a merge patch to a resource
    async fn update(&self, path: &str, id: &str, patch: JsonValue) -> ClientResult<JsonValue>;

    async fn delete(&self, path: &str, id: &str) -> ClientResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ClientError::api(429, "too_many_requests", "slow down").is_retryable());
        assert!(ClientError::api(503, "unavailable", "try later").is_retryable());
        assert!(ClientError::transport("connection reset").is_retryable());
        assert!(!ClientError::api(400, "bad_request", "nope").is_retryable());
        assert!(!ClientError::api(404, "not_found", "gone").is_retryable());
    }

    #[test]
    fn not_found() {
        assert!(ClientError::api(404, "vpc_not_found", "gone").is_not_found());
        assert!(!ClientError::transport("timeout").is_not_found());
    }

    #[test]
    fn display() {
        let err = ClientError::api(409, "conflict", "VPC is busy");
        assert_eq!(err.to_string(), "API error 409 (conflict): VPC is busy");
    }
}

//! Planning transport port
//!
//! Defines the single outbound operation the pipeline needs from a remote
//! reasoning service: send text, get raw text back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors a transport may report for one call.
///
/// [`is_transient`](TransportError::is_transient) separates failures worth
/// retrying (timeouts, dropped connections, remote throttling, 5xx) from
/// terminal ones that will fail the same way on every attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Rate limited by remote (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout
                | TransportError::Connection(_)
                | TransportError::RateLimited { .. }
                | TransportError::Server { .. }
        )
    }

    /// Remote hint for how long to wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => TransportError::Authentication(message),
            408 => TransportError::Timeout,
            429 => TransportError::RateLimited { retry_after },
            500..=599 => TransportError::Server { status, message },
            400..=499 => TransportError::InvalidRequest(message),
            _ => TransportError::InvalidResponse(format!("unexpected status {status}: {message}")),
        }
    }
}

/// Model parameters sent with every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl RequestParams {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Raw remote-call transport.
///
/// Implementations (adapters) live in the infrastructure layer. They must
/// not retry on their own; retry, backoff and fallback belong to
/// [`ResilientClient`](crate::use_cases::resilient_client::ResilientClient).
#[async_trait]
pub trait PlanningTransport: Send + Sync {
    /// Name of the remote target. Breaker and rate-limiter state are kept
    /// per target.
    fn target(&self) -> &str;

    /// Send `text` and return the raw response text.
    ///
    /// `timeout` is the time left before the request deadline.
    async fn call(
        &self,
        text: &str,
        params: &RequestParams,
        timeout: Duration,
    ) -> Result<String, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Connection("reset".into()).is_transient());
        assert!(TransportError::RateLimited { retry_after: None }.is_transient());
        assert!(
            TransportError::Server {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!TransportError::Authentication("bad key".into()).is_transient());
        assert!(!TransportError::InvalidRequest("bad".into()).is_transient());
        assert!(!TransportError::InvalidResponse("garbage".into()).is_transient());
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            TransportError::from_status(401, "", None),
            TransportError::Authentication(_)
        ));
        assert!(matches!(
            TransportError::from_status(400, "", None),
            TransportError::InvalidRequest(_)
        ));
        assert_eq!(
            TransportError::from_status(429, "", Some(Duration::from_secs(3))).retry_after(),
            Some(Duration::from_secs(3))
        );
        assert!(TransportError::from_status(502, "bad gateway", None).is_transient());
        assert_eq!(TransportError::from_status(408, "", None), TransportError::Timeout);
    }

    #[test]
    fn test_request_params_builder() {
        let params = RequestParams::default()
            .with_model("local-llm")
            .with_temperature(0.0)
            .with_max_tokens(256);
        assert_eq!(params.model, "local-llm");
        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.max_tokens, 256);
    }
}

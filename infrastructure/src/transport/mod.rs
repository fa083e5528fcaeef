//! Planning transport adapters
//!
//! Implementations of [`PlanningTransport`](planner_application::PlanningTransport):
//! an OpenAI-compatible HTTP client (feature `http`) and an in-process
//! loopback used for offline runs and demos.

#[cfg(feature = "http")]
pub mod http;
pub mod loopback;

#[cfg(feature = "http")]
pub use http::HttpChatTransport;
pub use loopback::LoopbackTransport;

use crate::config::{FileTransportConfig, TransportKind};
use planner_application::PlanningTransport;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors building a transport from configuration.
#[derive(Error, Debug)]
pub enum TransportSetupError {
    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("HTTP transport not compiled in (enable the `http` feature)")]
    Unsupported,
}

/// Build the transport selected by `[transport] kind`.
pub fn build_transport(
    config: &FileTransportConfig,
) -> Result<Arc<dyn PlanningTransport>, TransportSetupError> {
    match config.kind {
        TransportKind::Loopback => Ok(Arc::new(LoopbackTransport::new(Duration::from_millis(
            config.loopback_latency_ms,
        )))),
        #[cfg(feature = "http")]
        TransportKind::Http => Ok(Arc::new(HttpChatTransport::from_config(config)?)),
        #[cfg(not(feature = "http"))]
        TransportKind::Http => Err(TransportSetupError::Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_loopback_transport() {
        let config = FileTransportConfig {
            kind: TransportKind::Loopback,
            ..Default::default()
        };
        let transport = build_transport(&config).unwrap();
        assert_eq!(transport.target(), "loopback");
    }
}

//! Infrastructure layer for agent-planner
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: planning transports, the JSONL event log and
//! configuration file loading.

pub mod config;
pub mod logging;
pub mod transport;

// Re-export commonly used types
pub use config::{
    ConfigLoader, ConfigValidationError, FileCacheConfig, FileCircuitBreakerConfig, FileConfig,
    FileCoordinatorConfig, FileLoggingConfig, FileRateLimitConfig, FileResilienceConfig,
    FileSemanticCacheConfig, FileTransportConfig, TransportKind,
};
pub use logging::JsonlEventLog;
#[cfg(feature = "http")]
pub use transport::HttpChatTransport;
pub use transport::{LoopbackTransport, TransportSetupError, build_transport};

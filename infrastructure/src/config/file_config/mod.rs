//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Durations are plain integers with the unit in the key name; conversion
//! to the application's typed configuration happens in
//! [`FileConfig::to_planner_config`].

mod cache;
mod coordinator;
mod resilience;
mod transport;

pub use cache::{FileCacheConfig, FileSemanticCacheConfig};
pub use coordinator::FileCoordinatorConfig;
pub use resilience::{FileCircuitBreakerConfig, FileRateLimitConfig, FileResilienceConfig};
pub use transport::{FileLoggingConfig, FileTransportConfig, TransportKind};

use planner_application::{BusyPolicy, ConfigError, CoordinatorConfig, PlannerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigValidationError {
    #[error(transparent)]
    Planner(#[from] ConfigError),

    #[error("transport.endpoint cannot be empty")]
    EmptyEndpoint,

    #[error("transport.model cannot be empty")]
    EmptyModelName,
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub resilience: FileResilienceConfig,
    pub rate_limit: FileRateLimitConfig,
    pub circuit_breaker: FileCircuitBreakerConfig,
    pub response_cache: FileCacheConfig,
    pub semantic_cache: FileSemanticCacheConfig,
    pub coordinator: FileCoordinatorConfig,
    pub transport: FileTransportConfig,
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Convert to the application's configuration and validate it.
    pub fn to_planner_config(&self) -> Result<PlannerConfig, ConfigValidationError> {
        if self.transport.kind == TransportKind::Http && self.transport.endpoint.trim().is_empty() {
            return Err(ConfigValidationError::EmptyEndpoint);
        }
        if self.transport.model.trim().is_empty() {
            return Err(ConfigValidationError::EmptyModelName);
        }

        let busy_policy: BusyPolicy = self.coordinator.busy_policy.parse()?;
        let coordinator = CoordinatorConfig {
            busy_policy,
            worker_threads: self.coordinator.worker_threads,
            max_concurrent_requests: self.coordinator.max_concurrent_requests,
            watchdog_grace: Duration::from_millis(self.coordinator.watchdog_grace_ms),
            request_params: self.transport.request_params(),
        };

        let config = PlannerConfig::default()
            .with_resilience(
                self.resilience
                    .to_resilience_config(&self.rate_limit, &self.circuit_breaker),
            )
            .with_response_cache((&self.response_cache).into())
            .with_semantic_cache((&self.semantic_cache).into())
            .with_coordinator(coordinator);
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML (for `--show-config`).
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

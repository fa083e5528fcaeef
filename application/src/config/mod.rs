//! Application-level configuration.
//!
//! - [`ResilienceConfig`] — deadline, retry/backoff, rate limit, circuit breaker
//! - [`ResponseCacheConfig`] / [`SemanticCacheConfig`] — cache sizing and thresholds
//! - [`CoordinatorConfig`] — busy policy, worker pool, watchdog, request parameters
//! - [`PlannerConfig`] — container handed to the composition root

pub mod cache_params;
pub mod coordinator_params;
pub mod resilience_params;

pub use cache_params::{ResponseCacheConfig, SemanticCacheConfig};
pub use coordinator_params::{BusyPolicy, CoordinatorConfig};
pub use resilience_params::{CircuitBreakerConfig, RateLimitConfig, ResilienceConfig, RetryConfig};

use std::time::Duration;
use thiserror::Error;

/// Configuration rejected by [`PlannerConfig::validate`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be between 0 and 1, got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be at least 1.0, got {value}")]
    ShrinkingCooldown { field: &'static str, value: f64 },

    #[error("retry.max_delay ({max:?}) is shorter than retry.base_delay ({base:?})")]
    InvertedBackoff { base: Duration, max: Duration },

    #[error("invalid value for {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },
}

/// Every knob of the planning pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlannerConfig {
    pub resilience: ResilienceConfig,
    pub response_cache: ResponseCacheConfig,
    pub semantic_cache: SemanticCacheConfig,
    pub coordinator: CoordinatorConfig,
}

impl PlannerConfig {
    pub fn with_resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.resilience = resilience;
        self
    }

    pub fn with_response_cache(mut self, config: ResponseCacheConfig) -> Self {
        self.response_cache = config;
        self
    }

    pub fn with_semantic_cache(mut self, config: SemanticCacheConfig) -> Self {
        self.semantic_cache = config;
        self
    }

    pub fn with_coordinator(mut self, config: CoordinatorConfig) -> Self {
        self.coordinator = config;
        self
    }

    /// Check every value the pipeline cannot run with. Returns the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.resilience;
        non_zero_duration("resilience.request_deadline", r.request_deadline)?;
        non_zero_duration("retry.base_delay", r.retry.base_delay)?;
        if r.retry.max_delay < r.retry.base_delay {
            return Err(ConfigError::InvertedBackoff {
                base: r.retry.base_delay,
                max: r.retry.max_delay,
            });
        }
        non_zero("rate_limit.quota", r.rate_limit.quota as usize)?;
        non_zero_duration("rate_limit.window", r.rate_limit.window)?;
        non_zero("circuit_breaker.failure_threshold", r.circuit_breaker.failure_threshold as usize)?;
        non_zero_duration("circuit_breaker.failure_window", r.circuit_breaker.failure_window)?;
        non_zero_duration("circuit_breaker.cooldown", r.circuit_breaker.cooldown)?;
        if r.circuit_breaker.cooldown_multiplier < 1.0 {
            return Err(ConfigError::ShrinkingCooldown {
                field: "circuit_breaker.cooldown_multiplier",
                value: r.circuit_breaker.cooldown_multiplier,
            });
        }

        non_zero("response_cache.capacity", self.response_cache.capacity)?;
        non_zero_duration("response_cache.ttl", self.response_cache.ttl)?;

        let s = &self.semantic_cache;
        non_zero("semantic_cache.capacity", s.capacity)?;
        unit_range("semantic_cache.min_similarity", f64::from(s.min_similarity))?;
        unit_range("semantic_cache.min_success_rate", s.min_success_rate)?;
        non_zero_duration("semantic_cache.max_age", s.max_age)?;

        non_zero("coordinator.worker_threads", self.coordinator.worker_threads)?;
        non_zero(
            "coordinator.max_concurrent_requests",
            self.coordinator.max_concurrent_requests,
        )?;
        Ok(())
    }
}

fn non_zero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { field });
    }
    Ok(())
}

fn non_zero_duration(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::Zero { field });
    }
    Ok(())
}

fn unit_range(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange { field, value });
    }
    Ok(())
}

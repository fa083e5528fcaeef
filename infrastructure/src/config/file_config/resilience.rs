//! `[resilience]`, `[rate_limit]` and `[circuit_breaker]` sections.

use planner_application::{CircuitBreakerConfig, RateLimitConfig, ResilienceConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deadline and retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileResilienceConfig {
    /// Hard deadline for one planning request, retries included
    pub request_deadline_ms: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for FileResilienceConfig {
    fn default() -> Self {
        let defaults = ResilienceConfig::default();
        Self {
            request_deadline_ms: defaults.request_deadline.as_millis() as u64,
            max_retries: defaults.retry.max_retries,
            backoff_base_ms: defaults.retry.base_delay.as_millis() as u64,
            backoff_max_ms: defaults.retry.max_delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRateLimitConfig {
    pub quota: u32,
    pub window_secs: u64,
    /// How long a request may wait for a permit
    pub acquire_budget_ms: u64,
}

impl Default for FileRateLimitConfig {
    fn default() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            quota: defaults.quota,
            window_secs: defaults.window.as_secs(),
            acquire_budget_ms: defaults.acquire_budget.as_millis() as u64,
        }
    }
}

impl From<&FileRateLimitConfig> for RateLimitConfig {
    fn from(file: &FileRateLimitConfig) -> Self {
        Self {
            quota: file.quota,
            window: Duration::from_secs(file.window_secs),
            acquire_budget: Duration::from_millis(file.acquire_budget_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCircuitBreakerConfig {
    pub failure_threshold: u32,
    pub failure_window_secs: u64,
    pub cooldown_secs: u64,
    pub cooldown_multiplier: f64,
    pub max_cooldown_secs: u64,
}

impl Default for FileCircuitBreakerConfig {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            failure_window_secs: defaults.failure_window.as_secs(),
            cooldown_secs: defaults.cooldown.as_secs(),
            cooldown_multiplier: defaults.cooldown_multiplier,
            max_cooldown_secs: defaults.max_cooldown.as_secs(),
        }
    }
}

impl From<&FileCircuitBreakerConfig> for CircuitBreakerConfig {
    fn from(file: &FileCircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: file.failure_threshold,
            failure_window: Duration::from_secs(file.failure_window_secs),
            cooldown: Duration::from_secs(file.cooldown_secs),
            cooldown_multiplier: file.cooldown_multiplier,
            max_cooldown: Duration::from_secs(file.max_cooldown_secs),
        }
    }
}

impl FileResilienceConfig {
    pub fn to_resilience_config(
        &self,
        rate_limit: &FileRateLimitConfig,
        circuit_breaker: &FileCircuitBreakerConfig,
    ) -> ResilienceConfig {
        ResilienceConfig {
            request_deadline: Duration::from_millis(self.request_deadline_ms),
            retry: RetryConfig {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.backoff_base_ms),
                max_delay: Duration::from_millis(self.backoff_max_ms),
            },
            rate_limit: rate_limit.into(),
            circuit_breaker: circuit_breaker.into(),
        }
    }
}

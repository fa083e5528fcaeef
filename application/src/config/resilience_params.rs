//! Resilience parameters — deadline, retry, rate limit and circuit breaker.
//!
//! One [`ResilienceConfig`] describes the call profile of a single remote
//! target. Every component takes only the slice it needs.

use std::time::Duration;

/// Retry budget and exponential backoff between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
    /// Upper bound for any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Sliding-window rate limit for outbound calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Calls allowed per window.
    pub quota: u32,
    pub window: Duration,
    /// How long a request may wait for a permit before falling back.
    pub acquire_budget: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            quota: 60,
            window: Duration::from_secs(60),
            acquire_budget: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failures within `failure_window` that open the circuit.
    pub failure_threshold: u32,
    pub failure_window: Duration,
    /// Time spent Open before a probe is allowed.
    pub cooldown: Duration,
    /// Growth factor applied to the cool-down after each failed probe.
    pub cooldown_multiplier: f64,
    pub max_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
            cooldown_multiplier: 2.0,
            max_cooldown: Duration::from_secs(300),
        }
    }
}

/// Complete call profile for one remote target.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    /// Hard deadline for a whole request, retries included.
    pub request_deadline: Duration,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_secs(30),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ResilienceConfig {
    // ==================== Builder Methods ====================

    pub fn with_request_deadline(mut self, deadline: Duration) -> Self {
        self.request_deadline = deadline;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.retry.base_delay = base;
        self.retry.max_delay = cap;
        self
    }

    pub fn with_rate_limit(mut self, quota: u32, window: Duration) -> Self {
        self.rate_limit.quota = quota;
        self.rate_limit.window = window;
        self
    }

    pub fn with_acquire_budget(mut self, budget: Duration) -> Self {
        self.rate_limit.acquire_budget = budget;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker.failure_threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.circuit_breaker.cooldown = cooldown;
        self
    }
}

//! Resilience primitives shared process-wide per remote target.

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limiter;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerStats, CircuitState, Ticket};
pub use rate_limiter::{RateLimiter, RateLimiterStats, TokioClock};

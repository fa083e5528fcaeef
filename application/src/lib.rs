//! Application layer for agent-planner
//!
//! This crate contains the ports, configuration, resilience primitives,
//! caches and use cases of the planning pipeline. It depends only on the
//! domain layer.

pub mod cache;
pub mod config;
pub mod metrics;
pub mod ports;
pub mod resilience;
pub mod use_cases;
pub mod worker_pool;

mod sync;

// Re-export commonly used types
pub use cache::{ResponseCache, SemanticCache, SemanticHit};
pub use config::{
    BusyPolicy, CircuitBreakerConfig, ConfigError, CoordinatorConfig, PlannerConfig,
    RateLimitConfig, ResilienceConfig, ResponseCacheConfig, RetryConfig, SemanticCacheConfig,
};
pub use metrics::{MetricsSnapshot, PlannerMetrics};
pub use ports::{
    agent_events::{AgentEventObserver, NoEventObserver},
    planning_transport::{PlanningTransport, RequestParams, TransportError},
};
pub use resilience::{CircuitBreaker, CircuitState, RateLimiter};
pub use use_cases::planning_coordinator::{
    AgentSnapshot, PlanningCoordinator, PlanningNotification, Rejection, Submission,
};
pub use use_cases::planning_hub::PlanningHub;
pub use use_cases::resilient_client::{ClientRequest, ResilientClient};
pub use use_cases::services::PlanningServices;
pub use worker_pool::{PoolError, WorkerPool};

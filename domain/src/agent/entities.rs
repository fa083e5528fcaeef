//! Planning entities: requests, results and the tasks they carry

use super::value_objects::{AgentId, RequestId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// A single unit of work handed to the execution layer.
///
/// The planner never interprets a task; it only needs to serialize and
/// compare it. Parameters are kept in a sorted map so two tasks with the
/// same content always serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub kind: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}

/// A natural-language goal submitted for one agent.
///
/// Immutable once created. The coordinator that created it owns it until
/// the request completes or is cancelled.
#[derive(Debug, Clone)]
pub struct PlanningRequest {
    id: RequestId,
    agent_id: AgentId,
    text: String,
    submitted_at: SystemTime,
}

impl PlanningRequest {
    pub fn new(agent_id: AgentId, text: impl Into<String>) -> Self {
        Self {
            id: RequestId::generate(),
            agent_id,
            text: text.into(),
            submitted_at: SystemTime::now(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn submitted_at(&self) -> SystemTime {
        self.submitted_at
    }
}

/// Where a planning result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    /// Produced by the remote service or the fallback generator
    #[default]
    None,
    /// Served by the exact-match response cache
    Exact,
    /// Served by the semantic plan cache
    Semantic,
}

impl CacheSource {
    pub fn as_str(&self) -> &str {
        match self {
            CacheSource::None => "none",
            CacheSource::Exact => "exact",
            CacheSource::Semantic => "semantic",
        }
    }

    pub fn is_cached(&self) -> bool {
        !matches!(self, CacheSource::None)
    }
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a request was resolved by the fallback generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Every attempt failed with a transient error
    RetriesExhausted,
    /// The remote rejected the request (credentials, validation, unparsable output)
    Terminal,
    /// The circuit breaker refused the call
    CircuitOpen,
    /// No local rate-limit permit within the acquire budget
    RateLimited,
    /// The request deadline elapsed
    DeadlineExceeded,
    /// The request was cancelled before a usable response arrived
    Cancelled,
    /// The planning task never reported back (pool saturated or shut down)
    Unavailable,
}

impl FallbackReason {
    pub fn as_str(&self) -> &str {
        match self {
            FallbackReason::RetriesExhausted => "retries_exhausted",
            FallbackReason::Terminal => "terminal",
            FallbackReason::CircuitOpen => "circuit_open",
            FallbackReason::RateLimited => "rate_limited",
            FallbackReason::DeadlineExceeded => "deadline_exceeded",
            FallbackReason::Cancelled => "cancelled",
            FallbackReason::Unavailable => "unavailable",
        }
    }

    /// Terminal failures point at configuration (bad credentials, malformed
    /// requests) rather than load, and are reported separately.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, FallbackReason::Terminal)
    }

    pub const ALL: [FallbackReason; 7] = [
        FallbackReason::RetriesExhausted,
        FallbackReason::Terminal,
        FallbackReason::CircuitOpen,
        FallbackReason::RateLimited,
        FallbackReason::DeadlineExceeded,
        FallbackReason::Cancelled,
        FallbackReason::Unavailable,
    ];
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one planning request. Produced once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningResult {
    pub request_id: RequestId,
    pub tasks: Vec<Task>,
    pub raw_text: String,
    pub is_fallback: bool,
    pub served_from_cache: CacheSource,
    pub latency: Duration,
    pub fallback_reason: Option<FallbackReason>,
    /// Transport attempts spent on this request (0 for cache hits)
    pub attempts: u32,
}

impl PlanningResult {
    /// A genuine plan parsed from a remote response.
    pub fn remote(
        request_id: RequestId,
        tasks: Vec<Task>,
        raw_text: impl Into<String>,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            request_id,
            tasks,
            raw_text: raw_text.into(),
            is_fallback: false,
            served_from_cache: CacheSource::None,
            latency,
            fallback_reason: None,
            attempts,
        }
    }

    /// A degraded plan produced locally.
    pub fn fallback(
        request_id: RequestId,
        tasks: Vec<Task>,
        reason: FallbackReason,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            request_id,
            tasks,
            raw_text: String::new(),
            is_fallback: true,
            served_from_cache: CacheSource::None,
            latency,
            fallback_reason: Some(reason),
            attempts,
        }
    }

    /// Re-issue a stored result for a new request.
    ///
    /// Cached results keep their tasks and raw text but take the new
    /// request's id, the cache tag and the (near-zero) lookup latency.
    pub fn reissue(&self, request_id: RequestId, source: CacheSource, latency: Duration) -> Self {
        Self {
            request_id,
            served_from_cache: source,
            latency,
            attempts: 0,
            ..self.clone()
        }
    }
}

//! Pipeline counters.
//!
//! Plain atomics, updated on the hot path and read as a serializable
//! [`MetricsSnapshot`]. Cancelled requests are counted on their own and
//! stay out of the fallback totals.

use crate::cache::{ResponseCacheStats, SemanticCacheStats};
use crate::resilience::{CircuitBreakerStats, RateLimiterStats};
use planner_domain::{CacheSource, FallbackReason, PlanningResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PlannerMetrics {
    requests: AtomicU64,
    transport_calls: AtomicU64,
    retries: AtomicU64,
    remote_plans: AtomicU64,
    exact_hits: AtomicU64,
    semantic_hits: AtomicU64,
    fallbacks: [AtomicU64; FallbackReason::ALL.len()],
    cancelled: AtomicU64,
    plans_delivered: AtomicU64,
}

impl PlannerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_call(&self) {
        self.transport_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one result by where it came from.
    pub fn record_result(&self, result: &PlanningResult) {
        match result.fallback_reason {
            Some(FallbackReason::Cancelled) => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Some(reason) => {
                self.fallbacks[reason_index(reason)].fetch_add(1, Ordering::Relaxed);
                return;
            }
            None => {}
        }
        let counter = match result.served_from_cache {
            CacheSource::None => &self.remote_plans,
            CacheSource::Exact => &self.exact_hits,
            CacheSource::Semantic => &self.semantic_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one result handed to an agent.
    pub fn record_delivered(&self) {
        self.plans_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fallback_count(&self, reason: FallbackReason) -> u64 {
        self.fallbacks[reason_index(reason)].load(Ordering::Relaxed)
    }

    pub fn cancelled_count(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let fallbacks: BTreeMap<String, u64> = FallbackReason::ALL
            .iter()
            .map(|reason| (reason.as_str().to_string(), self.fallback_count(*reason)))
            .filter(|(_, count)| *count > 0)
            .collect();
        let fallback_total: u64 = fallbacks.values().sum();
        let remote_plans = self.remote_plans.load(Ordering::Relaxed);
        let exact_hits = self.exact_hits.load(Ordering::Relaxed);
        let semantic_hits = self.semantic_hits.load(Ordering::Relaxed);
        let produced = remote_plans + exact_hits + semantic_hits + fallback_total;

        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            transport_calls: self.transport_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            remote_plans,
            exact_cache_hits: exact_hits,
            semantic_cache_hits: semantic_hits,
            fallback_plans: fallback_total,
            fallbacks,
            cancelled: self.cancelled_count(),
            fallback_rate: if produced == 0 {
                0.0
            } else {
                fallback_total as f64 / produced as f64
            },
            plans_delivered: self.plans_delivered.load(Ordering::Relaxed),
            response_cache: None,
            semantic_cache: None,
            circuit_breaker: None,
            rate_limiter: None,
        }
    }
}

fn reason_index(reason: FallbackReason) -> usize {
    FallbackReason::ALL
        .iter()
        .position(|r| *r == reason)
        .unwrap_or_default()
}

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub transport_calls: u64,
    pub retries: u64,
    pub remote_plans: u64,
    pub exact_cache_hits: u64,
    pub semantic_cache_hits: u64,
    pub fallback_plans: u64,
    /// Fallback count per reason; reasons never seen are omitted
    pub fallbacks: BTreeMap<String, u64>,
    /// Requests abandoned by their agent; not part of `fallback_rate`
    pub cancelled: u64,
    pub fallback_rate: f64,
    pub plans_delivered: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_cache: Option<ResponseCacheStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_cache: Option<SemanticCacheStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<RateLimiterStats>,
}

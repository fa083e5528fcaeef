//! Shared planning services.
//!
//! One [`PlanningServices`] is built at startup and handed to every
//! [`PlanningCoordinator`](super::planning_coordinator::PlanningCoordinator).
//! It owns the process-wide pieces: the resilient client (with its rate
//! limiter, circuit breaker and response cache), the semantic cache, the
//! worker pool, the metrics and the event observer.

use crate::cache::SemanticCache;
use crate::config::PlannerConfig;
use crate::metrics::{MetricsSnapshot, PlannerMetrics};
use crate::ports::agent_events::{AgentEventObserver, NoEventObserver};
use crate::ports::planning_transport::PlanningTransport;
use crate::use_cases::resilient_client::ResilientClient;
use crate::worker_pool::WorkerPool;
use planner_domain::{NgramEmbedder, TextEmbedder};
use std::sync::Arc;

pub struct PlanningServices {
    pub config: PlannerConfig,
    pub client: Arc<ResilientClient>,
    pub semantic_cache: Arc<SemanticCache>,
    pub pool: Arc<WorkerPool>,
    pub metrics: Arc<PlannerMetrics>,
    pub observer: Arc<dyn AgentEventObserver>,
}

impl PlanningServices {
    /// Wire the default stack around `transport`: n-gram embeddings, no
    /// event observer.
    pub fn new(
        transport: Arc<dyn PlanningTransport>,
        config: PlannerConfig,
        pool: Arc<WorkerPool>,
    ) -> Self {
        let metrics = Arc::new(PlannerMetrics::new());
        let client = ResilientClient::new(transport, &config).with_metrics(metrics.clone());
        let semantic_cache = SemanticCache::new(
            config.semantic_cache.clone(),
            Arc::new(NgramEmbedder::default()),
        );
        Self {
            config,
            client: Arc::new(client),
            semantic_cache: Arc::new(semantic_cache),
            pool,
            metrics,
            observer: Arc::new(NoEventObserver),
        }
    }

    /// Replace the client. Its metrics become the shared metrics.
    pub fn with_client(mut self, client: ResilientClient) -> Self {
        self.metrics = client.metrics().clone();
        self.client = Arc::new(client);
        self
    }

    /// Rebuild the (still empty) semantic cache around another embedder.
    pub fn with_embedder(mut self, embedder: Arc<dyn TextEmbedder>) -> Self {
        self.semantic_cache = Arc::new(SemanticCache::new(
            self.config.semantic_cache.clone(),
            embedder,
        ));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentEventObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Pipeline counters plus the current state of every shared component.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.response_cache = Some(self.client.response_cache().stats());
        snapshot.semantic_cache = Some(self.semantic_cache.stats());
        snapshot.circuit_breaker = Some(self.client.circuit_breaker().stats());
        snapshot.rate_limiter = Some(self.client.rate_limiter().stats());
        snapshot
    }
}

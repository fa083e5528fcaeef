//! Planning hub: the inbound surface for the agent/execution layer.
//!
//! Maps agent ids to their [`PlanningCoordinator`]s. Each coordinator sits
//! behind its own mutex, so agents never contend with each other; the map
//! itself is only write-locked to register a new agent.

use super::planning_coordinator::{
    AgentSnapshot, PlanningCoordinator, PlanningNotification, Rejection, Submission,
};
use super::services::PlanningServices;
use crate::metrics::MetricsSnapshot;
use crate::sync::{lock, read, write};
use planner_domain::{AgentId, AgentState, PlanningResult, StateTransition};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

type SharedCoordinator = Arc<Mutex<PlanningCoordinator>>;

pub struct PlanningHub {
    services: Arc<PlanningServices>,
    agents: RwLock<HashMap<AgentId, SharedCoordinator>>,
}

impl PlanningHub {
    pub fn new(services: Arc<PlanningServices>) -> Self {
        Self {
            services,
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &Arc<PlanningServices> {
        &self.services
    }

    /// Register `agent_id`. Returns `false` if it was already known.
    pub fn register(&self, agent_id: AgentId) -> bool {
        let mut agents = write(&self.agents);
        if agents.contains_key(&agent_id) {
            return false;
        }
        debug!(agent_id = %agent_id, "Registered agent");
        let coordinator = PlanningCoordinator::new(agent_id.clone(), self.services.clone());
        agents.insert(agent_id, Arc::new(Mutex::new(coordinator)));
        true
    }

    /// Known agents, sorted by id.
    pub fn agents(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = read(&self.agents).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Submit a goal, registering the agent on first use.
    pub fn submit_goal(&self, agent_id: &AgentId, text: &str) -> Result<Submission, Rejection> {
        self.register(agent_id.clone());
        let coordinator = self.coordinator(agent_id)?;
        let mut coordinator = lock(&coordinator);
        coordinator.submit_goal(text)
    }

    /// Cancel the agent's outstanding request and pending goal.
    pub fn cancel(&self, agent_id: &AgentId) -> Result<bool, Rejection> {
        self.with_agent(agent_id, PlanningCoordinator::cancel)
    }

    pub fn state(&self, agent_id: &AgentId) -> Option<AgentState> {
        self.with_agent(agent_id, |c| c.state()).ok()
    }

    pub fn snapshot(&self, agent_id: &AgentId) -> Option<AgentSnapshot> {
        self.with_agent(agent_id, |c| c.snapshot()).ok()
    }

    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.agents()
            .iter()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    pub fn current_plan(&self, agent_id: &AgentId) -> Option<PlanningResult> {
        self.with_agent(agent_id, |c| c.current_plan().cloned())
            .ok()
            .flatten()
    }

    /// Poll every agent once. Never waits on planning work.
    pub fn tick(&self) -> Vec<PlanningNotification> {
        let coordinators: Vec<SharedCoordinator> = read(&self.agents).values().cloned().collect();
        coordinators
            .iter()
            .flat_map(|coordinator| lock(coordinator).tick())
            .collect()
    }

    pub fn pause(&self, agent_id: &AgentId) -> Result<StateTransition, Rejection> {
        self.with_agent(agent_id, PlanningCoordinator::pause)?
    }

    pub fn resume(&self, agent_id: &AgentId) -> Result<StateTransition, Rejection> {
        self.with_agent(agent_id, PlanningCoordinator::resume)?
    }

    pub fn finish_execution(
        &self,
        agent_id: &AgentId,
        success: bool,
    ) -> Result<StateTransition, Rejection> {
        self.with_agent(agent_id, |c| c.finish_execution(success))?
    }

    pub fn fail(&self, agent_id: &AgentId) -> Result<StateTransition, Rejection> {
        self.with_agent(agent_id, PlanningCoordinator::fail)?
    }

    pub fn reset(&self, agent_id: &AgentId) -> Result<Option<StateTransition>, Rejection> {
        self.with_agent(agent_id, PlanningCoordinator::reset)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.services.metrics_snapshot()
    }

    /// Drop stale and poorly performing semantic entries and expired
    /// response-cache entries. Returns the number of entries removed.
    pub fn cleanup_caches(&self) -> usize {
        let semantic = self.services.semantic_cache.cleanup();
        let exact = self.services.client.response_cache().purge_expired();
        semantic + exact
    }

    /// Cancel every outstanding request and close the worker pool.
    ///
    /// The pool itself is stopped by its owner
    /// ([`WorkerPool::shutdown_blocking`](crate::worker_pool::WorkerPool::shutdown_blocking)
    /// or [`drain`](crate::worker_pool::WorkerPool::drain)).
    pub fn shutdown(&self) {
        let coordinators: Vec<SharedCoordinator> = read(&self.agents).values().cloned().collect();
        for coordinator in &coordinators {
            lock(coordinator).shutdown();
        }
        self.services.pool.close();
        info!(agents = coordinators.len(), "Planning hub shut down");
    }

    fn coordinator(&self, agent_id: &AgentId) -> Result<SharedCoordinator, Rejection> {
        read(&self.agents)
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Rejection::UnknownAgent(agent_id.clone()))
    }

    fn with_agent<R>(
        &self,
        agent_id: &AgentId,
        f: impl FnOnce(&mut PlanningCoordinator) -> R,
    ) -> Result<R, Rejection> {
        let coordinator = self.coordinator(agent_id)?;
        let mut coordinator = lock(&coordinator);
        Ok(f(&mut coordinator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::ports::planning_transport::{PlanningTransport, RequestParams, TransportError};
    use crate::resilience::CircuitState;
    use crate::worker_pool::WorkerPool;
    use async_trait::async_trait;
    use planner_domain::{CacheSource, EmbeddingVector, FallbackReason, TextEmbedder};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingTransport {
        healthy: bool,
        calls: AtomicU32,
    }

    impl CountingTransport {
        fn new(healthy: bool) -> Self {
            Self {
                healthy,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlanningTransport for CountingTransport {
        fn target(&self) -> &str {
            "counting"
        }

        async fn call(
            &self,
            text: &str,
            _params: &RequestParams,
            _timeout: Duration,
        ) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(300)).await;
            if !self.healthy {
                return Err(TransportError::Timeout);
            }
            Ok(format!(
                r#"{{"plan": "{text}", "tasks": [{{"kind": "build", "parameters": {{"structure": "shelter"}}}}, {{"kind": "place", "parameters": {{"block": "torch"}}}}]}}"#
            ))
        }
    }

    /// Fixed vectors: the two shelter goals are 0.9 apart.
    struct ShelterEmbedder;

    impl TextEmbedder for ShelterEmbedder {
        fn embed(&self, text: &str) -> EmbeddingVector {
            let values = match text {
                "build a small shelter" => vec![1.0, 0.0],
                "construct a tiny house" => vec![0.9, 0.435_889_9],
                _ => vec![0.0, 1.0],
            };
            EmbeddingVector::new(values)
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn hub(transport: Arc<CountingTransport>) -> PlanningHub {
        let pool = Arc::new(WorkerPool::current(8));
        let services = PlanningServices::new(transport, PlannerConfig::default(), pool)
            .with_embedder(Arc::new(ShelterEmbedder));
        PlanningHub::new(Arc::new(services))
    }

    /// Drive the hub like a control loop until `agent_id` gets a result.
    async fn run_until_planned(hub: &PlanningHub, agent_id: &AgentId) -> PlanningResult {
        for _ in 0..2000 {
            for notification in hub.tick() {
                if let PlanningNotification::Completed {
                    agent_id: id,
                    result,
                } = notification
                    && &id == agent_id
                {
                    return result;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("agent {agent_id} never received a plan");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_transport_ends_in_executing_fallback() {
        let transport = Arc::new(CountingTransport::new(false));
        let hub = hub(transport.clone());
        let agent = AgentId::new("x");

        hub.submit_goal(&agent, "build a small shelter").unwrap();
        assert_eq!(hub.state(&agent), Some(AgentState::Planning));
        let result = run_until_planned(&hub, &agent).await;

        assert!(result.is_fallback);
        assert_eq!(result.fallback_reason, Some(FallbackReason::RetriesExhausted));
        assert!(!result.tasks.is_empty());
        assert_eq!(transport.calls(), 4);
        assert_eq!(
            hub.services().client.circuit_breaker().state(),
            CircuitState::Open
        );
        assert_eq!(hub.state(&agent), Some(AgentState::Executing));
        assert!(hub.current_plan(&agent).unwrap().is_fallback);
        // Degraded plans are never cached
        assert!(hub.services().semantic_cache.is_empty());
        assert!(hub.services().client.response_cache().is_empty());

        let metrics = hub.metrics();
        assert_eq!(metrics.retries, 3);
        assert_eq!(metrics.fallbacks.get("retries_exhausted"), Some(&1));
        assert_eq!(metrics.circuit_breaker.unwrap().state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_goal_served_from_response_cache() {
        let transport = Arc::new(CountingTransport::new(true));
        let hub = hub(transport.clone());
        let agent = AgentId::new("x");

        hub.submit_goal(&agent, "build a small shelter").unwrap();
        let first = run_until_planned(&hub, &agent).await;
        assert_eq!(first.served_from_cache, CacheSource::None);
        hub.finish_execution(&agent, true).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        hub.submit_goal(&agent, "build a small shelter").unwrap();
        let second = run_until_planned(&hub, &agent).await;

        assert_eq!(second.served_from_cache, CacheSource::Exact);
        assert!(!second.is_fallback);
        assert!(second.latency < Duration::from_millis(1));
        assert_eq!(second.tasks, first.tasks);
        assert_ne!(second.request_id, first.request_id);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paraphrased_goal_served_from_semantic_cache() {
        let transport = Arc::new(CountingTransport::new(true));
        let hub = hub(transport.clone());
        let builder = AgentId::new("x");
        let helper = AgentId::new("y");

        hub.submit_goal(&builder, "build a small shelter").unwrap();
        let original = run_until_planned(&hub, &builder).await;

        hub.submit_goal(&helper, "construct a tiny house").unwrap();
        let reused = run_until_planned(&hub, &helper).await;

        assert_eq!(reused.served_from_cache, CacheSource::Semantic);
        assert_eq!(reused.tasks, original.tasks);
        assert_eq!(reused.raw_text, original.raw_text);
        assert_eq!(transport.calls(), 1);
        assert_eq!(hub.state(&helper), Some(AgentState::Executing));

        // The helper's success counts for the shared entry
        hub.finish_execution(&helper, true).unwrap();
        let entry = hub
            .services()
            .semantic_cache
            .find_similar("build a small shelter")
            .unwrap()
            .entry_id;
        assert_eq!(
            hub.services().semantic_cache.outcomes(entry).unwrap().successes,
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_agent_rejected_but_others_proceed() {
        let transport = Arc::new(CountingTransport::new(true));
        let hub = hub(transport);
        let x = AgentId::new("x");
        let y = AgentId::new("y");

        hub.submit_goal(&x, "build a small shelter").unwrap();
        assert!(matches!(
            hub.submit_goal(&x, "attack the zombie"),
            Err(Rejection::AlreadyBusy { .. })
        ));
        assert!(hub.submit_goal(&y, "attack the zombie").is_ok());

        assert_eq!(hub.agents(), vec![x.clone(), y.clone()]);
        assert_eq!(hub.state(&x), Some(AgentState::Planning));
        assert_eq!(hub.state(&y), Some(AgentState::Planning));
        assert_ne!(
            hub.snapshot(&x).unwrap().active_request,
            hub.snapshot(&y).unwrap().active_request
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_agent_rejected() {
        let hub = hub(Arc::new(CountingTransport::new(true)));
        let ghost = AgentId::new("ghost");

        assert_eq!(
            hub.cancel(&ghost),
            Err(Rejection::UnknownAgent(ghost.clone()))
        );
        assert_eq!(hub.state(&ghost), None);
        assert!(hub.pause(&ghost).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_then_resubmit() {
        let transport = Arc::new(CountingTransport::new(true));
        let hub = hub(transport);
        let agent = AgentId::new("x");

        hub.submit_goal(&agent, "attack the zombie").unwrap();
        assert_eq!(hub.cancel(&agent), Ok(true));
        assert_eq!(hub.state(&agent), Some(AgentState::Idle));

        hub.submit_goal(&agent, "build a small shelter").unwrap();
        let result = run_until_planned(&hub, &agent).await;
        assert!(!result.is_fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_new_goals() {
        let hub = hub(Arc::new(CountingTransport::new(true)));
        let agent = AgentId::new("x");
        hub.submit_goal(&agent, "build a small shelter").unwrap();

        hub.shutdown();
        hub.services().pool.drain().await;

        assert_eq!(
            hub.submit_goal(&AgentId::new("y"), "attack the zombie"),
            Err(Rejection::ShuttingDown)
        );
        // The cancelled request still resolves so the agent is not stuck
        let result = run_until_planned(&hub, &agent).await;
        assert!(result.is_fallback);
    }
}

//! Resilient client use case.
//!
//! Wraps a raw [`PlanningTransport`] with everything needed to call an
//! unreliable remote service from a latency-bound loop:
//!
//! 1. Exact-match [`ResponseCache`] lookup ([`ResilientClient::cached`])
//! 2. [`RateLimiter`] permit within a short budget
//! 3. [`CircuitBreaker`] admission before every attempt
//! 4. Transport call bounded by the request deadline, retried with
//!    exponential backoff on transient errors only
//! 5. Write-through to the response cache on success
//! 6. A heuristic [`FallbackPlanner`] plan on any failure
//!
//! [`ResilientClient::request`] never returns an error: every path ends in
//! a usable [`PlanningResult`], fallback-tagged when degraded.

use crate::cache::{CacheKey, ResponseCache};
use crate::config::PlannerConfig;
use crate::metrics::PlannerMetrics;
use crate::ports::planning_transport::{PlanningTransport, RequestParams};
use crate::resilience::{Admission, BackoffPolicy, CircuitBreaker, RateLimiter};
use planner_domain::{
    CacheSource, FallbackPlanner, FallbackReason, PlanningResult, RequestId, Task, parse_plan,
    truncate_str,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One call into [`ResilientClient`].
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub request_id: RequestId,
    pub text: String,
    /// Overrides the client's default parameters
    pub params: Option<RequestParams>,
    /// Overrides the configured request deadline
    pub deadline: Option<Duration>,
    /// Absolute deadline, e.g. anchored at submission. Wins when earlier
    /// than the relative one.
    pub deadline_at: Option<Instant>,
    pub cancel: CancellationToken,
}

impl ClientRequest {
    pub fn new(request_id: RequestId, text: impl Into<String>) -> Self {
        Self {
            request_id,
            text: text.into(),
            params: None,
            deadline: None,
            deadline_at: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_deadline_at(mut self, deadline_at: Instant) -> Self {
        self.deadline_at = Some(deadline_at);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A parsed remote plan.
struct RemotePlan {
    tasks: Vec<Task>,
    raw_text: String,
    attempts: u32,
}

/// Why the remote path gave up.
#[derive(Debug)]
struct Failure {
    reason: FallbackReason,
    attempts: u32,
}

impl Failure {
    fn new(reason: FallbackReason, attempts: u32) -> Self {
        Self { reason, attempts }
    }
}

/// Resilient wrapper around one remote target.
///
/// Rate limiter, breaker and response cache are shared: clone the `Arc`s
/// into every client that talks to the same target.
pub struct ResilientClient {
    transport: Arc<dyn PlanningTransport>,
    params: RequestParams,
    deadline: Duration,
    max_attempts: u32,
    backoff: BackoffPolicy,
    acquire_budget: Duration,
    rate_limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    response_cache: Arc<ResponseCache>,
    fallback: Arc<FallbackPlanner>,
    metrics: Arc<PlannerMetrics>,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn PlanningTransport>, config: &PlannerConfig) -> Self {
        let resilience = &config.resilience;
        let breaker = CircuitBreaker::new(transport.target(), resilience.circuit_breaker.clone());
        Self {
            params: config.coordinator.request_params.clone(),
            deadline: resilience.request_deadline,
            max_attempts: resilience.retry.max_attempts(),
            backoff: BackoffPolicy::from_config(&resilience.retry),
            acquire_budget: resilience.rate_limit.acquire_budget,
            rate_limiter: Arc::new(RateLimiter::from_config(&resilience.rate_limit)),
            breaker: Arc::new(breaker),
            response_cache: Arc::new(ResponseCache::new(&config.response_cache)),
            fallback: Arc::new(FallbackPlanner::default()),
            metrics: Arc::new(PlannerMetrics::new()),
            transport,
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_response_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.response_cache = cache;
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<FallbackPlanner>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PlannerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn target(&self) -> &str {
        self.transport.target()
    }

    pub fn default_params(&self) -> &RequestParams {
        &self.params
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn response_cache(&self) -> &Arc<ResponseCache> {
        &self.response_cache
    }

    pub fn fallback_planner(&self) -> &Arc<FallbackPlanner> {
        &self.fallback
    }

    pub fn metrics(&self) -> &Arc<PlannerMetrics> {
        &self.metrics
    }

    /// Full pipeline: exact cache, then the remote path.
    pub async fn request(&self, request: ClientRequest) -> PlanningResult {
        self.metrics.record_request();
        let params = self.params_for(&request);
        if let Some(hit) = self.cached(request.request_id, &request.text, &params) {
            return hit;
        }
        self.fetch(request).await
    }

    /// Exact-match lookup only. The hit is re-issued under `request_id`.
    pub fn cached(
        &self,
        request_id: RequestId,
        text: &str,
        params: &RequestParams,
    ) -> Option<PlanningResult> {
        let started = Instant::now();
        let key = CacheKey::for_request(text, self.target(), params);
        let stored = self.response_cache.get(&key)?;
        let hit = stored.reissue(request_id, CacheSource::Exact, started.elapsed());
        debug!(request_id = %request_id, "Served plan from response cache");
        self.metrics.record_result(&hit);
        Some(hit)
    }

    /// Remote path without the cache read: rate limit, breaker, attempts
    /// with backoff, fallback. Successful plans are written to the cache.
    pub async fn fetch(&self, request: ClientRequest) -> PlanningResult {
        let started = Instant::now();
        let relative = started + request.deadline.unwrap_or(self.deadline);
        let deadline = request.deadline_at.map_or(relative, |at| at.min(relative));
        let params = self.params_for(&request);

        let result = match self.call_remote(&request, &params, deadline).await {
            Ok(plan) => {
                let result = PlanningResult::remote(
                    request.request_id,
                    plan.tasks,
                    plan.raw_text,
                    started.elapsed(),
                    plan.attempts,
                );
                let key = CacheKey::for_request(&request.text, self.target(), &params);
                self.response_cache.put(key, result.clone());
                info!(
                    request_id = %request.request_id,
                    attempts = result.attempts,
                    tasks = result.tasks.len(),
                    latency_ms = result.latency.as_millis() as u64,
                    "Remote plan received"
                );
                result
            }
            Err(failure) => self.degrade(&request, failure, started),
        };
        self.metrics.record_result(&result);
        result
    }

    /// Locally generated plan for `text`, outside any request.
    pub fn fallback_plan(
        &self,
        request_id: RequestId,
        text: &str,
        reason: FallbackReason,
        latency: Duration,
    ) -> PlanningResult {
        let tasks = self.fallback.plan(text);
        PlanningResult::fallback(request_id, tasks, reason, latency, 0)
    }

    fn params_for(&self, request: &ClientRequest) -> RequestParams {
        request.params.clone().unwrap_or_else(|| self.params.clone())
    }

    fn degrade(&self, request: &ClientRequest, failure: Failure, started: Instant) -> PlanningResult {
        let tasks = self.fallback.plan(&request.text);
        let result = PlanningResult::fallback(
            request.request_id,
            tasks,
            failure.reason,
            started.elapsed(),
            failure.attempts,
        );
        if failure.reason.is_configuration_error() {
            warn!(
                request_id = %request.request_id,
                target_name = %self.target(),
                "Remote rejected the request; check credentials and request parameters. Using fallback plan"
            );
        } else if failure.reason == FallbackReason::Cancelled {
            debug!(request_id = %request.request_id, "Request cancelled");
        } else {
            warn!(
                request_id = %request.request_id,
                reason = %failure.reason,
                attempts = failure.attempts,
                goal = %truncate_str(&request.text, 60),
                "Using fallback plan"
            );
        }
        result
    }

    async fn call_remote(
        &self,
        request: &ClientRequest,
        params: &RequestParams,
        deadline: Instant,
    ) -> Result<RemotePlan, Failure> {
        let cancel = &request.cancel;
        if cancel.is_cancelled() {
            return Err(Failure::new(FallbackReason::Cancelled, 0));
        }

        let budget = self
            .acquire_budget
            .min(deadline.saturating_duration_since(Instant::now()));
        let permitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Failure::new(FallbackReason::Cancelled, 0)),
            permitted = self.rate_limiter.acquire_within(budget) => permitted,
        };
        if !permitted {
            return Err(Failure::new(FallbackReason::RateLimited, 0));
        }

        let mut attempts = 0u32;
        let mut last_admission = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                if let Some(admission) = last_admission {
                    self.breaker.record_failure(admission);
                }
                return Err(Failure::new(FallbackReason::DeadlineExceeded, attempts));
            }

            let admission = self.breaker.admit();
            if admission == Admission::Rejected {
                return Err(Failure::new(FallbackReason::CircuitOpen, attempts));
            }
            last_admission = Some(admission);

            attempts += 1;
            self.metrics.record_transport_call();
            debug!(
                request_id = %request.request_id,
                attempt = attempts,
                probe = admission.is_probe(),
                "Calling remote"
            );

            // In-flight calls are not interrupted by cancellation; only the
            // deadline cuts them short.
            let outcome = tokio::time::timeout_at(
                deadline,
                self.transport.call(&request.text, params, remaining),
            )
            .await;

            let error = match outcome {
                Err(_elapsed) => {
                    // One failure for the attempt, one for the request
                    self.breaker.record_failure(admission);
                    self.breaker.record_failure(admission);
                    return Err(Failure::new(FallbackReason::DeadlineExceeded, attempts));
                }
                Ok(Ok(raw_text)) => {
                    let Some(plan) = parse_plan(&raw_text) else {
                        self.breaker.abandon_probe(admission);
                        warn!(
                            request_id = %request.request_id,
                            response = %truncate_str(&raw_text, 80),
                            "Remote response holds no usable plan"
                        );
                        return Err(Failure::new(FallbackReason::Terminal, attempts));
                    };
                    self.breaker.record_success(admission);
                    if cancel.is_cancelled() {
                        return Err(Failure::new(FallbackReason::Cancelled, attempts));
                    }
                    return Ok(RemotePlan {
                        tasks: plan.tasks,
                        raw_text,
                        attempts,
                    });
                }
                Ok(Err(error)) => error,
            };

            if !error.is_transient() {
                self.breaker.abandon_probe(admission);
                warn!(
                    request_id = %request.request_id,
                    error = %error,
                    "Terminal transport error, not retrying"
                );
                return Err(Failure::new(FallbackReason::Terminal, attempts));
            }

            self.breaker.record_failure(admission);
            debug!(
                request_id = %request.request_id,
                attempt = attempts,
                error = %error,
                "Transient transport error"
            );

            if cancel.is_cancelled() {
                return Err(Failure::new(FallbackReason::Cancelled, attempts));
            }
            if attempts >= self.max_attempts {
                self.breaker.record_failure(admission);
                return Err(Failure::new(FallbackReason::RetriesExhausted, attempts));
            }

            let delay = self.backoff.delay_with_hint(attempts, error.retry_after());
            if Instant::now() + delay >= deadline {
                self.breaker.record_failure(admission);
                return Err(Failure::new(FallbackReason::DeadlineExceeded, attempts));
            }

            self.metrics.record_retry();
            debug!(
                request_id = %request.request_id,
                delay_ms = delay.as_millis() as u64,
                "Backing off before retry"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Failure::new(FallbackReason::Cancelled, attempts));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

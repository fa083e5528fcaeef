//! Planning coordinator use case.
//!
//! One [`PlanningCoordinator`] per agent. It owns the agent's
//! [`AgentStateMachine`] and at most one in-flight planning request, and is
//! driven from the control loop:
//!
//! - [`submit_goal`](PlanningCoordinator::submit_goal) starts a request on
//!   the worker pool and returns immediately
//! - [`tick`](PlanningCoordinator::tick) polls the request without waiting,
//!   applies a finished result to the state machine and returns the
//!   notifications produced since the last tick
//!
//! Lookup order inside a request: exact response cache, semantic cache,
//! then the remote path of [`ResilientClient`].

use super::resilient_client::{ClientRequest, ResilientClient};
use super::services::PlanningServices;
use crate::cache::SemanticCache;
use crate::config::BusyPolicy;
use crate::metrics::PlannerMetrics;
use planner_domain::{
    AgentId, AgentState, AgentStateMachine, CacheSource, EntryId, FallbackReason, PlanningRequest,
    PlanningResult, RequestId, StateTransition, TransitionError, truncate_str,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Inbound operation refused synchronously.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Agent {agent_id} is already busy ({state})")]
    AlreadyBusy { agent_id: AgentId, state: AgentState },

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Goal text is empty")]
    EmptyGoal,

    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Planner is shutting down")]
    ShuttingDown,
}

/// Accepted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Planning started under this request id
    Started(RequestId),
    /// Stored as the pending goal; starts once the agent is free
    Queued,
}

/// Something the control loop should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanningNotification {
    /// Delivered once per accepted goal that reached a result
    Completed {
        agent_id: AgentId,
        result: PlanningResult,
    },
    /// The request was cancelled before a result was applied
    Cancelled {
        agent_id: AgentId,
        request_id: RequestId,
    },
    /// A pending goal was replaced by a newer one before it started
    Superseded { agent_id: AgentId, goal: String },
}

/// Read-only view of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub state: AgentState,
    pub goal: Option<String>,
    pub active_request: Option<RequestId>,
    pub pending_goal: Option<String>,
    pub plan_tasks: usize,
    pub plan_is_fallback: bool,
    pub plan_source: Option<CacheSource>,
}

/// What a planning job hands back.
#[derive(Debug)]
struct PlanOutcome {
    result: PlanningResult,
    /// Semantic entry that served or stored the plan
    semantic_entry: Option<EntryId>,
}

struct InFlight {
    request: PlanningRequest,
    cancel: CancellationToken,
    receiver: oneshot::Receiver<PlanOutcome>,
    submitted: Instant,
    /// Hard deadline of the whole request, queueing included
    deadline_at: Instant,
}

pub struct PlanningCoordinator {
    services: Arc<PlanningServices>,
    machine: AgentStateMachine,
    in_flight: Option<InFlight>,
    pending_goal: Option<String>,
    current_plan: Option<PlanningResult>,
    plan_entry: Option<EntryId>,
    outbox: Vec<PlanningNotification>,
}

impl PlanningCoordinator {
    pub fn new(agent_id: AgentId, services: Arc<PlanningServices>) -> Self {
        Self {
            services,
            machine: AgentStateMachine::new(agent_id),
            in_flight: None,
            pending_goal: None,
            current_plan: None,
            plan_entry: None,
            outbox: Vec::new(),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        self.machine.agent_id()
    }

    pub fn state(&self) -> AgentState {
        self.machine.state()
    }

    pub fn active_request(&self) -> Option<RequestId> {
        self.machine.active_request()
    }

    pub fn pending_goal(&self) -> Option<&str> {
        self.pending_goal.as_deref()
    }

    /// Plan the agent is executing (or last executed).
    pub fn current_plan(&self) -> Option<&PlanningResult> {
        self.current_plan.as_ref()
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: self.agent_id().clone(),
            state: self.state(),
            goal: self.machine.current_goal().map(str::to_string),
            active_request: self.active_request(),
            pending_goal: self.pending_goal.clone(),
            plan_tasks: self.current_plan.as_ref().map_or(0, |plan| plan.tasks.len()),
            plan_is_fallback: self
                .current_plan
                .as_ref()
                .is_some_and(|plan| plan.is_fallback),
            plan_source: self.current_plan.as_ref().map(|plan| plan.served_from_cache),
        }
    }

    /// Accept a new goal.
    ///
    /// An idle agent (or one that finished, successfully or not) starts
    /// planning at once. A busy agent follows the configured
    /// [`BusyPolicy`].
    pub fn submit_goal(&mut self, text: &str) -> Result<Submission, Rejection> {
        let goal = text.trim();
        if goal.is_empty() {
            return Err(self.reject(Rejection::EmptyGoal));
        }
        if self.services.pool.is_shut_down() {
            return Err(self.reject(Rejection::ShuttingDown));
        }

        let state = self.state();
        if state.is_busy() {
            match self.services.config.coordinator.busy_policy {
                BusyPolicy::Reject => {
                    return Err(self.reject(Rejection::AlreadyBusy {
                        agent_id: self.agent_id().clone(),
                        state,
                    }));
                }
                BusyPolicy::Queue => {
                    if let Some(replaced) = self.pending_goal.replace(goal.to_string()) {
                        debug!(agent_id = %self.agent_id(), "Pending goal superseded");
                        self.outbox.push(PlanningNotification::Superseded {
                            agent_id: self.agent_id().clone(),
                            goal: replaced,
                        });
                    }
                    info!(agent_id = %self.agent_id(), %state, "Goal queued until agent is free");
                    return Ok(Submission::Queued);
                }
                BusyPolicy::Preempt => {
                    info!(agent_id = %self.agent_id(), %state, "Preempting current work for new goal");
                    self.abort_current();
                }
            }
        }

        self.start(goal)
    }

    /// Cancel the outstanding request (or stop execution) and drop any
    /// pending goal. Returns `false` if there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        let had_pending = self.pending_goal.take().is_some();
        let aborted = self.abort_current();
        had_pending || aborted
    }

    /// Apply a finished request, run the watchdog, start a pending goal
    /// when the agent is free, and return everything that happened.
    ///
    /// Never waits.
    pub fn tick(&mut self) -> Vec<PlanningNotification> {
        self.poll_in_flight();
        self.start_pending();
        std::mem::take(&mut self.outbox)
    }

    pub fn pause(&mut self) -> Result<StateTransition, Rejection> {
        let transition = self.machine.pause()?;
        self.emit(&transition);
        Ok(transition)
    }

    pub fn resume(&mut self) -> Result<StateTransition, Rejection> {
        let transition = self.machine.resume()?;
        self.emit(&transition);
        Ok(transition)
    }

    /// The execution layer ran out of tasks (`success`) or gave up.
    ///
    /// The outcome is fed back to the semantic entry the plan came from.
    pub fn finish_execution(&mut self, success: bool) -> Result<StateTransition, Rejection> {
        let transition = if success {
            self.machine.complete()?
        } else {
            match self.state() {
                AgentState::Executing | AgentState::Paused => self.machine.fail()?,
                from => {
                    return Err(Rejection::InvalidTransition(TransitionError::Illegal {
                        from,
                        to: AgentState::Failed,
                    }));
                }
            }
        };
        self.record_plan_outcome(success);
        self.emit(&transition);
        Ok(transition)
    }

    /// Unrecoverable error: move to Failed from anywhere, cancelling the
    /// outstanding request.
    pub fn fail(&mut self) -> Result<StateTransition, Rejection> {
        let was_executing = matches!(self.state(), AgentState::Executing | AgentState::Paused);
        let transition = self.machine.fail()?;
        self.discard_in_flight();
        if was_executing {
            self.record_plan_outcome(false);
        }
        self.emit(&transition);
        Ok(transition)
    }

    /// Back to Idle, dropping the request, the pending goal and the plan.
    pub fn reset(&mut self) -> Option<StateTransition> {
        self.discard_in_flight();
        self.pending_goal = None;
        self.current_plan = None;
        self.plan_entry = None;
        let transition = self.machine.reset()?;
        self.emit(&transition);
        Some(transition)
    }

    /// Cancel the outstanding request without touching the state machine.
    /// Used on system teardown.
    pub fn shutdown(&mut self) {
        if let Some(flight) = &self.in_flight {
            flight.cancel.cancel();
        }
        self.pending_goal = None;
    }

    fn start(&mut self, goal: &str) -> Result<Submission, Rejection> {
        if let Some(transition) = self.reset_if_finished() {
            self.emit(&transition);
        }

        let request = PlanningRequest::new(self.agent_id().clone(), goal);
        let transition = self.machine.begin_planning(&request)?;

        let services = &self.services;
        let submitted = Instant::now();
        let deadline_at = submitted + services.client.deadline();
        let cancel = services.pool.child_token();
        let client_request = ClientRequest::new(request.id(), goal)
            .with_params(services.config.coordinator.request_params.clone())
            .with_deadline_at(deadline_at)
            .with_cancel(cancel.clone());
        services.metrics.record_request();

        let job = plan_goal(
            services.client.clone(),
            services.semantic_cache.clone(),
            services.metrics.clone(),
            client_request,
        );
        let receiver = match services.pool.spawn(job) {
            Ok(receiver) => receiver,
            Err(e) => {
                warn!(agent_id = %self.agent_id(), error = %e, "Could not schedule planning request");
                // Roll back; the Planning transition was never published
                let _ = self.machine.cancel_planning();
                return Err(self.reject(Rejection::ShuttingDown));
            }
        };

        let request_id = request.id();
        self.current_plan = None;
        self.plan_entry = None;
        self.in_flight = Some(InFlight {
            request,
            cancel,
            receiver,
            submitted,
            deadline_at,
        });
        self.emit(&transition);
        info!(
            agent_id = %self.agent_id(),
            request_id = %request_id,
            goal = %truncate_str(goal, 60),
            "Planning started"
        );

        Ok(Submission::Started(request_id))
    }

    fn reset_if_finished(&mut self) -> Option<StateTransition> {
        if self.state().is_terminal() {
            self.current_plan = None;
            self.plan_entry = None;
            self.machine.reset()
        } else {
            None
        }
    }

    fn poll_in_flight(&mut self) {
        let grace = self.services.config.coordinator.watchdog_grace;
        let Some(flight) = self.in_flight.as_mut() else {
            return;
        };
        let polled = match flight.receiver.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(TryRecvError::Empty) if Instant::now() < flight.deadline_at + grace => return,
            // Watchdog: the job never reported back in time
            Err(TryRecvError::Empty) => Err(FallbackReason::DeadlineExceeded),
            Err(TryRecvError::Closed) => Err(FallbackReason::Unavailable),
        };
        let Some(flight) = self.in_flight.take() else {
            return;
        };

        let outcome = match polled {
            Ok(outcome) => outcome,
            Err(reason) => {
                flight.cancel.cancel();
                warn!(
                    agent_id = %self.agent_id(),
                    request_id = %flight.request.id(),
                    %reason,
                    "Planning job did not report back; planning locally"
                );
                let result = self.services.client.fallback_plan(
                    flight.request.id(),
                    flight.request.text(),
                    reason,
                    flight.submitted.elapsed(),
                );
                self.services.metrics.record_result(&result);
                PlanOutcome {
                    result,
                    semantic_entry: None,
                }
            }
        };
        self.deliver(flight.request, outcome);
    }

    fn deliver(&mut self, request: PlanningRequest, outcome: PlanOutcome) {
        let PlanOutcome {
            result,
            semantic_entry,
        } = outcome;
        let transition = match self
            .machine
            .finish_planning(request.id(), !result.tasks.is_empty())
        {
            Ok(transition) => transition,
            Err(e) => {
                debug!(agent_id = %self.agent_id(), error = %e, "Dropping stale planning result");
                return;
            }
        };

        self.services.metrics.record_delivered();
        self.emit(&transition);
        self.services
            .observer
            .on_planning_complete(self.agent_id(), &result);
        info!(
            agent_id = %self.agent_id(),
            request_id = %request.id(),
            source = %result.served_from_cache,
            fallback = result.is_fallback,
            tasks = result.tasks.len(),
            state = %self.state(),
            "Plan delivered"
        );

        if self.state() == AgentState::Executing {
            self.current_plan = Some(result.clone());
            self.plan_entry = semantic_entry;
        }
        self.outbox.push(PlanningNotification::Completed {
            agent_id: self.agent_id().clone(),
            result,
        });
    }

    fn start_pending(&mut self) {
        if self.state().is_busy() {
            return;
        }
        let Some(goal) = self.pending_goal.take() else {
            return;
        };
        if let Err(e) = self.start(&goal) {
            warn!(agent_id = %self.agent_id(), error = %e, "Pending goal could not start");
        }
    }

    /// Cancel planning or stop execution. Returns whether anything changed.
    fn abort_current(&mut self) -> bool {
        let transition = match self.state() {
            AgentState::Planning => {
                self.discard_in_flight();
                self.machine.cancel_planning()
            }
            AgentState::Executing | AgentState::Paused => {
                self.current_plan = None;
                self.plan_entry = None;
                self.machine.stop()
            }
            _ => return false,
        };
        match transition {
            Ok(transition) => {
                self.emit(&transition);
                true
            }
            Err(e) => {
                warn!(agent_id = %self.agent_id(), error = %e, "Could not abort current work");
                false
            }
        }
    }

    fn discard_in_flight(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            flight.cancel.cancel();
            debug!(
                agent_id = %self.agent_id(),
                request_id = %flight.request.id(),
                "Planning request cancelled"
            );
            self.outbox.push(PlanningNotification::Cancelled {
                agent_id: self.agent_id().clone(),
                request_id: flight.request.id(),
            });
        }
    }

    fn record_plan_outcome(&mut self, success: bool) {
        if let Some(entry) = self.plan_entry.take() {
            self.services.semantic_cache.record_outcome(entry, success);
        }
    }

    fn emit(&self, transition: &StateTransition) {
        debug!(
            agent_id = %transition.agent_id,
            from = %transition.from,
            to = %transition.to,
            "State transition"
        );
        self.services.observer.on_transition(transition);
    }

    fn reject(&self, rejection: Rejection) -> Rejection {
        debug!(agent_id = %self.agent_id(), reason = %rejection, "Rejected");
        self.services
            .observer
            .on_rejected(self.agent_id(), &rejection.to_string());
        rejection
    }
}

/// Body of one planning job: exact cache, semantic cache, remote.
async fn plan_goal(
    client: Arc<ResilientClient>,
    semantic_cache: Arc<SemanticCache>,
    metrics: Arc<PlannerMetrics>,
    request: ClientRequest,
) -> PlanOutcome {
    let started = Instant::now();
    let params = request
        .params
        .clone()
        .unwrap_or_else(|| client.default_params().clone());

    if let Some(result) = client.cached(request.request_id, &request.text, &params) {
        return PlanOutcome {
            result,
            semantic_entry: None,
        };
    }

    if let Some(hit) = semantic_cache.find_similar(&request.text) {
        let result = hit
            .plan
            .reissue(request.request_id, CacheSource::Semantic, started.elapsed());
        metrics.record_result(&result);
        debug!(
            request_id = %request.request_id,
            similarity = hit.similarity,
            "Served plan from semantic cache"
        );
        return PlanOutcome {
            result,
            semantic_entry: Some(hit.entry_id),
        };
    }

    let text = request.text.clone();
    let result = client.fetch(request).await;
    let semantic_entry = if result.is_fallback {
        None
    } else {
        semantic_cache.store(&text, result.clone())
    };
    PlanOutcome {
        result,
        semantic_entry,
    }
}

//! Agent event port
//!
//! Receives lifecycle events so they can be recorded or displayed outside
//! the core (JSONL event log, UI, metrics exporters). Separate from
//! `tracing`: tracing carries human-readable diagnostics, this port carries
//! structured records.

use planner_domain::{AgentId, PlanningResult, StateTransition};

/// Observer of agent lifecycle events.
///
/// Called synchronously from the control loop; implementations must be
/// quick and must not fail.
pub trait AgentEventObserver: Send + Sync {
    /// Called after every state transition.
    fn on_transition(&self, _transition: &StateTransition) {}

    /// Called when a planning result is delivered to an agent.
    fn on_planning_complete(&self, _agent_id: &AgentId, _result: &PlanningResult) {}

    /// Called when a goal or command is refused.
    fn on_rejected(&self, _agent_id: &AgentId, _reason: &str) {}
}

/// No-op observer for tests and when event logging is disabled.
pub struct NoEventObserver;

impl AgentEventObserver for NoEventObserver {}

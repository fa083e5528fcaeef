//! Per-agent lifecycle state machine.
//!
//! [`AgentStateMachine`] is the only place an agent's [`AgentState`] changes.
//! Every successful operation returns a [`StateTransition`] record that the
//! caller publishes to observers; illegal requests return a
//! [`TransitionError`] and leave the machine untouched.
//!
//! The active request id is written in exactly one place (entering
//! `Planning`) and cleared on every other transition, so it is non-null
//! precisely while the agent is planning.

use super::entities::PlanningRequest;
use super::state::AgentState;
use super::value_objects::{AgentId, RequestId};
use serde::Serialize;
use thiserror::Error;

/// Rejected lifecycle operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot move from {from} to {to}")]
    Illegal { from: AgentState, to: AgentState },

    #[error("no planning request is active (state: {state})")]
    NotPlanning { state: AgentState },

    #[error("request {got} is not the active planning request")]
    StaleRequest { got: RequestId },

    #[error("goal text is empty")]
    EmptyGoal,
}

/// A completed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub agent_id: AgentId,
    pub from: AgentState,
    pub to: AgentState,
    /// Request entered (to = Planning) or left (from = Planning)
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Clone)]
pub struct AgentStateMachine {
    agent_id: AgentId,
    state: AgentState,
    current_goal: Option<String>,
    active_request: Option<RequestId>,
    transitions: u64,
}

impl AgentStateMachine {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            state: AgentState::Idle,
            current_goal: None,
            active_request: None,
            transitions: 0,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn current_goal(&self) -> Option<&str> {
        self.current_goal.as_deref()
    }

    pub fn active_request(&self) -> Option<RequestId> {
        self.active_request
    }

    /// Number of transitions applied since creation.
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Idle → Planning for `request`.
    pub fn begin_planning(
        &mut self,
        request: &PlanningRequest,
    ) -> Result<StateTransition, TransitionError> {
        if request.text().trim().is_empty() {
            return Err(TransitionError::EmptyGoal);
        }
        let mut transition = self.move_to(AgentState::Planning)?;
        self.active_request = Some(request.id());
        self.current_goal = Some(request.text().to_string());
        transition.request_id = Some(request.id());
        Ok(transition)
    }

    /// Planning → Executing (plan has tasks) or Planning → Failed (it doesn't).
    ///
    /// Completions for any request other than the active one are rejected
    /// with [`TransitionError::StaleRequest`].
    pub fn finish_planning(
        &mut self,
        request_id: RequestId,
        has_tasks: bool,
    ) -> Result<StateTransition, TransitionError> {
        self.ensure_active(request_id)?;
        let next = if has_tasks {
            AgentState::Executing
        } else {
            AgentState::Failed
        };
        self.move_to(next)
    }

    /// Planning → Idle after the outstanding request was cancelled.
    pub fn cancel_planning(&mut self) -> Result<StateTransition, TransitionError> {
        if self.state != AgentState::Planning {
            return Err(TransitionError::NotPlanning { state: self.state });
        }
        self.move_to(AgentState::Idle)
    }

    pub fn pause(&mut self) -> Result<StateTransition, TransitionError> {
        self.move_from(AgentState::Executing, AgentState::Paused)
    }

    pub fn resume(&mut self) -> Result<StateTransition, TransitionError> {
        self.move_from(AgentState::Paused, AgentState::Executing)
    }

    /// Executing → Completed once the task stream is exhausted.
    pub fn complete(&mut self) -> Result<StateTransition, TransitionError> {
        self.move_from(AgentState::Executing, AgentState::Completed)
    }

    /// Executing/Paused → Idle on an explicit stop.
    pub fn stop(&mut self) -> Result<StateTransition, TransitionError> {
        match self.state {
            AgentState::Executing | AgentState::Paused => self.move_to(AgentState::Idle),
            from => Err(TransitionError::Illegal {
                from,
                to: AgentState::Idle,
            }),
        }
    }

    /// Any state → Failed.
    pub fn fail(&mut self) -> Result<StateTransition, TransitionError> {
        self.move_to(AgentState::Failed)
    }

    /// Force the machine back to Idle from wherever it is.
    ///
    /// Returns `None` when it already was Idle. Callers holding an
    /// outstanding request must cancel it themselves.
    pub fn reset(&mut self) -> Option<StateTransition> {
        if self.state == AgentState::Idle {
            return None;
        }
        let transition = self.record(AgentState::Idle);
        Some(transition)
    }

    fn ensure_active(&self, request_id: RequestId) -> Result<(), TransitionError> {
        match self.active_request {
            _ if self.state != AgentState::Planning => {
                Err(TransitionError::NotPlanning { state: self.state })
            }
            Some(active) if active == request_id => Ok(()),
            _ => Err(TransitionError::StaleRequest { got: request_id }),
        }
    }

    fn move_from(
        &mut self,
        expected: AgentState,
        to: AgentState,
    ) -> Result<StateTransition, TransitionError> {
        if self.state != expected {
            return Err(TransitionError::Illegal {
                from: self.state,
                to,
            });
        }
        self.move_to(to)
    }

    fn move_to(&mut self, to: AgentState) -> Result<StateTransition, TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError::Illegal {
                from: self.state,
                to,
            });
        }
        Ok(self.record(to))
    }

    fn record(&mut self, to: AgentState) -> StateTransition {
        let transition = StateTransition {
            agent_id: self.agent_id.clone(),
            from: self.state,
            to,
            request_id: self.active_request,
        };
        self.state = to;
        self.active_request = None;
        if to == AgentState::Idle {
            self.current_goal = None;
        }
        self.transitions += 1;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> AgentStateMachine {
        AgentStateMachine::new(AgentId::new("alex"))
    }

    fn request(text: &str) -> PlanningRequest {
        PlanningRequest::new(AgentId::new("alex"), text)
    }

    #[test]
    fn test_begin_planning_sets_active_request() {
        let mut m = machine();
        let req = request("build a small shelter");

        let t = m.begin_planning(&req).unwrap();

        assert_eq!(t.from, AgentState::Idle);
        assert_eq!(t.to, AgentState::Planning);
        assert_eq!(t.request_id, Some(req.id()));
        assert_eq!(m.state(), AgentState::Planning);
        assert_eq!(m.active_request(), Some(req.id()));
        assert_eq!(m.current_goal(), Some("build a small shelter"));
    }

    #[test]
    fn test_second_goal_while_planning_is_rejected() {
        let mut m = machine();
        let first = request("mine stone");
        m.begin_planning(&first).unwrap();

        let err = m.begin_planning(&request("gather wood")).unwrap_err();

        assert_eq!(
            err,
            TransitionError::Illegal {
                from: AgentState::Planning,
                to: AgentState::Planning
            }
        );
        assert_eq!(m.active_request(), Some(first.id()));
        assert_eq!(m.current_goal(), Some("mine stone"));
    }

    #[test]
    fn test_empty_goal_is_rejected() {
        let mut m = machine();
        assert_eq!(
            m.begin_planning(&request("   ")).unwrap_err(),
            TransitionError::EmptyGoal
        );
        assert_eq!(m.state(), AgentState::Idle);
    }

    #[test]
    fn test_finish_planning_clears_active_request() {
        let mut m = machine();
        let req = request("craft a pickaxe");
        m.begin_planning(&req).unwrap();

        let t = m.finish_planning(req.id(), true).unwrap();

        assert_eq!(t.to, AgentState::Executing);
        assert_eq!(t.request_id, Some(req.id()));
        assert_eq!(m.active_request(), None);
        assert_eq!(m.current_goal(), Some("craft a pickaxe"));
    }

    #[test]
    fn test_finish_planning_without_tasks_fails() {
        let mut m = machine();
        let req = request("craft a pickaxe");
        m.begin_planning(&req).unwrap();

        m.finish_planning(req.id(), false).unwrap();

        assert_eq!(m.state(), AgentState::Failed);
        assert_eq!(m.active_request(), None);
    }

    #[test]
    fn test_stale_completion_is_rejected() {
        let mut m = machine();
        let old = request("mine stone");
        m.begin_planning(&old).unwrap();
        m.cancel_planning().unwrap();
        let new = request("gather wood");
        m.begin_planning(&new).unwrap();

        assert_eq!(
            m.finish_planning(old.id(), true).unwrap_err(),
            TransitionError::StaleRequest { got: old.id() }
        );
        assert_eq!(m.state(), AgentState::Planning);
        assert_eq!(m.active_request(), Some(new.id()));
    }

    #[test]
    fn test_finish_when_not_planning() {
        let mut m = machine();
        assert_eq!(
            m.finish_planning(RequestId::generate(), true).unwrap_err(),
            TransitionError::NotPlanning {
                state: AgentState::Idle
            }
        );
    }

    #[test]
    fn test_cancel_planning_returns_to_idle() {
        let mut m = machine();
        m.begin_planning(&request("follow player")).unwrap();

        let t = m.cancel_planning().unwrap();

        assert_eq!(t.to, AgentState::Idle);
        assert_eq!(m.active_request(), None);
        assert_eq!(m.current_goal(), None);
        assert!(m.cancel_planning().is_err());
    }

    #[test]
    fn test_full_cycle_with_pause() {
        let mut m = machine();
        let req = request("build a wall");
        m.begin_planning(&req).unwrap();
        m.finish_planning(req.id(), true).unwrap();
        m.pause().unwrap();
        assert_eq!(m.state(), AgentState::Paused);
        assert!(m.complete().is_err());
        m.resume().unwrap();
        m.complete().unwrap();
        assert_eq!(m.state(), AgentState::Completed);
        let t = m.reset().unwrap();
        assert_eq!(t.from, AgentState::Completed);
        assert_eq!(m.state(), AgentState::Idle);
        assert_eq!(m.transition_count(), 6);
    }

    #[test]
    fn test_fail_from_any_state_clears_request() {
        let mut m = machine();
        m.begin_planning(&request("attack zombie")).unwrap();
        m.fail().unwrap();
        assert_eq!(m.state(), AgentState::Failed);
        assert_eq!(m.active_request(), None);
        assert!(m.fail().is_err());
    }

    #[test]
    fn test_stop_only_while_executing_or_paused() {
        let mut m = machine();
        assert!(m.stop().is_err());
        let req = request("gather wood");
        m.begin_planning(&req).unwrap();
        assert!(m.stop().is_err());
        m.finish_planning(req.id(), true).unwrap();
        m.stop().unwrap();
        assert_eq!(m.state(), AgentState::Idle);
    }

    #[test]
    fn test_reset_when_idle_is_noop() {
        let mut m = machine();
        assert!(m.reset().is_none());
        assert_eq!(m.transition_count(), 0);
    }

    #[test]
    fn test_active_request_iff_planning() {
        let mut m = machine();
        let steps: Vec<Box<dyn Fn(&mut AgentStateMachine)>> = vec![
            Box::new(|m| {
                m.begin_planning(&request("place torch")).unwrap();
            }),
            Box::new(|m| {
                let id = m.active_request().unwrap();
                m.finish_planning(id, true).unwrap();
            }),
            Box::new(|m| {
                m.pause().unwrap();
            }),
            Box::new(|m| {
                m.reset();
            }),
        ];
        for step in steps {
            step(&mut m);
            assert_eq!(
                m.active_request().is_some(),
                m.state() == AgentState::Planning
            );
        }
    }
}

//! Fixed-tick driver standing in for a game loop.
//!
//! Hands goals to agents round-robin, lets each agent "execute" a delivered
//! plan for a fixed number of ticks and then reports success. Never blocks:
//! every call into the hub returns immediately.

use planner_application::{PlanningHub, PlanningNotification, Submission};
use planner_domain::{AgentId, AgentState};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Simulation {
    hub: Arc<PlanningHub>,
    agents: Vec<AgentId>,
    backlog: HashMap<AgentId, VecDeque<String>>,
    executing: HashMap<AgentId, u32>,
    exec_ticks: u32,
}

impl Simulation {
    pub fn new(hub: Arc<PlanningHub>, agent_count: usize, goals: &[String], exec_ticks: u32) -> Self {
        let agents: Vec<AgentId> = (1..=agent_count.max(1))
            .map(|n| AgentId::new(format!("agent-{n}")))
            .collect();

        let mut backlog: HashMap<AgentId, VecDeque<String>> = HashMap::new();
        for (i, goal) in goals.iter().enumerate() {
            let agent = &agents[i % agents.len()];
            backlog.entry(agent.clone()).or_default().push_back(goal.clone());
        }
        for agent in &agents {
            hub.register(agent.clone());
        }

        Self {
            hub,
            agents,
            backlog,
            executing: HashMap::new(),
            exec_ticks: exec_ticks.max(1),
        }
    }

    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    /// Advance one tick. Returns what the hub delivered this tick.
    pub fn step(&mut self) -> Vec<PlanningNotification> {
        let notifications = self.hub.tick();

        for agent in &self.agents.clone() {
            match self.hub.state(agent) {
                Some(AgentState::Executing) => {
                    let ticks = self.executing.entry(agent.clone()).or_insert(0);
                    *ticks += 1;
                    if *ticks >= self.exec_ticks {
                        self.executing.remove(agent);
                        if let Err(e) = self.hub.finish_execution(agent, true) {
                            warn!(agent = %agent, "Could not finish execution: {}", e);
                        }
                    }
                }
                Some(state) if !state.is_busy() => self.submit_next(agent),
                _ => {}
            }
        }

        notifications
    }

    fn submit_next(&mut self, agent: &AgentId) {
        let Some(goal) = self.backlog.get_mut(agent).and_then(VecDeque::pop_front) else {
            return;
        };
        match self.hub.submit_goal(agent, &goal) {
            Ok(Submission::Started(request_id)) => {
                debug!(agent = %agent, %request_id, "Submitted goal: {}", goal);
            }
            Ok(Submission::Queued) => debug!(agent = %agent, "Queued goal: {}", goal),
            Err(e) => warn!(agent = %agent, "Goal '{}' rejected: {}", goal, e),
        }
    }

    /// No goals left to hand out and no agent busy.
    pub fn is_done(&self) -> bool {
        self.backlog.values().all(VecDeque::is_empty)
            && self.agents.iter().all(|agent| {
                self.hub
                    .snapshot(agent)
                    .is_none_or(|s| !s.state.is_busy() && s.pending_goal.is_none())
            })
    }
}

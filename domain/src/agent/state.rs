//! Agent lifecycle states and the legal transitions between them

use serde::{Deserialize, Serialize};

/// Lifecycle state of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Waiting for a goal
    #[default]
    Idle,
    /// A planning request is outstanding
    Planning,
    /// Tasks are being carried out by the execution layer
    Executing,
    /// Execution suspended by an external pause
    Paused,
    /// Task stream exhausted
    Completed,
    /// Unrecoverable error
    Failed,
}

impl AgentState {
    pub fn as_str(&self) -> &str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Planning => "planning",
            AgentState::Executing => "executing",
            AgentState::Paused => "paused",
            AgentState::Completed => "completed",
            AgentState::Failed => "failed",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            AgentState::Idle => "Idle",
            AgentState::Planning => "Planning",
            AgentState::Executing => "Executing",
            AgentState::Paused => "Paused",
            AgentState::Completed => "Completed",
            AgentState::Failed => "Failed",
        }
    }

    /// Whether `next` may directly follow this state.
    ///
    /// | from      | to                                  |
    /// |-----------|-------------------------------------|
    /// | Idle      | Planning, Failed                    |
    /// | Planning  | Executing, Idle, Failed             |
    /// | Executing | Completed, Paused, Idle, Failed     |
    /// | Paused    | Executing, Idle, Failed             |
    /// | Completed | Idle, Failed                        |
    /// | Failed    | Idle                                |
    pub fn can_transition_to(self, next: AgentState) -> bool {
        use AgentState::*;
        match (self, next) {
            (Failed, Failed) => false,
            (_, Failed) => true,
            (Idle, Planning) => true,
            (Planning, Executing | Idle) => true,
            (Executing, Completed | Paused | Idle) => true,
            (Paused, Executing | Idle) => true,
            (Completed | Failed, Idle) => true,
            _ => false,
        }
    }

    /// States reached at the end of a planning/execution cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Completed | AgentState::Failed)
    }

    /// States in which a new goal would conflict with ongoing work.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            AgentState::Planning | AgentState::Executing | AgentState::Paused
        )
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

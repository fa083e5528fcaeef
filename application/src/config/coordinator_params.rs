//! Coordinator parameters — busy policy, worker pool sizing and watchdog.

use super::ConfigError;
use crate::ports::planning_transport::RequestParams;
use std::str::FromStr;
use std::time::Duration;

/// What to do with a goal that arrives while the agent is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Refuse the goal with an explicit "already busy" rejection
    #[default]
    Reject,
    /// Keep it as the single pending goal, replacing an older pending one
    Queue,
    /// Cancel the current request or execution and start the new goal
    Preempt,
}

impl BusyPolicy {
    pub fn as_str(&self) -> &str {
        match self {
            BusyPolicy::Reject => "reject",
            BusyPolicy::Queue => "queue",
            BusyPolicy::Preempt => "preempt",
        }
    }
}

impl FromStr for BusyPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(BusyPolicy::Reject),
            "queue" => Ok(BusyPolicy::Queue),
            "preempt" => Ok(BusyPolicy::Preempt),
            other => Err(ConfigError::InvalidValue {
                field: "coordinator.busy_policy",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for BusyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub busy_policy: BusyPolicy,
    /// Threads of a dedicated worker pool.
    pub worker_threads: usize,
    /// Planning requests allowed to run at the same time across all agents.
    pub max_concurrent_requests: usize,
    /// Extra time past the request deadline before the coordinator stops
    /// waiting for a completion and plans locally.
    pub watchdog_grace: Duration,
    /// Parameters sent with every remote call.
    pub request_params: RequestParams,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            busy_policy: BusyPolicy::Reject,
            worker_threads: 2,
            max_concurrent_requests: 8,
            watchdog_grace: Duration::from_secs(5),
            request_params: RequestParams::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn with_watchdog_grace(mut self, grace: Duration) -> Self {
        self.watchdog_grace = grace;
        self
    }
}

//! `[coordinator]` section.

use planner_application::CoordinatorConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCoordinatorConfig {
    /// "reject", "queue" or "preempt"
    pub busy_policy: String,
    pub worker_threads: usize,
    pub max_concurrent_requests: usize,
    pub watchdog_grace_ms: u64,
}

impl Default for FileCoordinatorConfig {
    fn default() -> Self {
        let defaults = CoordinatorConfig::default();
        Self {
            busy_policy: defaults.busy_policy.to_string(),
            worker_threads: defaults.worker_threads,
            max_concurrent_requests: defaults.max_concurrent_requests,
            watchdog_grace_ms: defaults.watchdog_grace.as_millis() as u64,
        }
    }
}

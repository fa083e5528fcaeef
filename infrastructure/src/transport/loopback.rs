//! In-process planning transport
//!
//! Answers with the keyword planner's plan, rendered the way a remote model
//! would (a fenced JSON block), after a fixed latency. An outage switch makes
//! every call fail with a 503 so degraded behavior can be observed without a
//! network.

use async_trait::async_trait;
use planner_application::{PlanningTransport, RequestParams, TransportError};
use planner_domain::{FallbackPlanner, Task};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

const TARGET: &str = "loopback";

pub struct LoopbackTransport {
    planner: FallbackPlanner,
    latency: Duration,
    outage: AtomicBool,
    calls: AtomicU64,
}

impl LoopbackTransport {
    pub fn new(latency: Duration) -> Self {
        Self {
            planner: FallbackPlanner::default(),
            latency,
            outage: AtomicBool::new(false),
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_planner(mut self, planner: FallbackPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Toggle the simulated outage.
    pub fn set_outage(&self, outage: bool) {
        self.outage.store(outage, Ordering::SeqCst);
    }

    pub fn is_out(&self) -> bool {
        self.outage.load(Ordering::SeqCst)
    }

    /// Calls received so far, failed ones included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn render(&self, text: &str) -> String {
        let tasks: Vec<Task> = self
            .planner
            .plan(text)
            .into_iter()
            .map(|mut task| {
                task.parameters.remove("fallback_mode");
                task
            })
            .collect();
        let plan = json!({
            "reasoning": format!("{} step(s) for: {}", tasks.len(), text.trim()),
            "tasks": tasks,
        });
        format!("```json\n{plan:#}\n```")
    }
}

#[async_trait]
impl PlanningTransport for LoopbackTransport {
    fn target(&self) -> &str {
        TARGET
    }

    async fn call(
        &self,
        text: &str,
        _params: &RequestParams,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout);
        }
        tokio::time::sleep(self.latency).await;

        if self.is_out() {
            return Err(TransportError::Server {
                status: 503,
                message: "loopback outage".to_string(),
            });
        }
        Ok(self.render(text))
    }
}

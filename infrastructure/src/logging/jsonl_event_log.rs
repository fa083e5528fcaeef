//! Agent lifecycle events as JSON lines.
//!
//! Every record carries `type` and `timestamp` next to its payload fields.

use planner_application::{AgentEventObserver, MetricsSnapshot};
use planner_domain::{AgentId, PlanningResult, StateTransition};
use serde_json::{Value, json};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Agent event log, one JSON object per line.
pub struct JsonlEventLog {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlEventLog {
    /// Open `path` for writing, creating parent directories. The log is
    /// optional, so failure disables it with a warning instead of an error.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        match Self::create(path) {
            Ok(file) => Some(Self {
                writer: Mutex::new(BufWriter::new(file)),
                path: path.to_path_buf(),
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Event log disabled");
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a metrics snapshot as a `metrics` record.
    pub fn record_metrics(&self, snapshot: &MetricsSnapshot) {
        match serde_json::to_value(snapshot) {
            Ok(payload) => self.write("metrics", payload),
            Err(e) => warn!(error = %e, "Metrics snapshot not logged"),
        }
    }

    fn create(path: &Path) -> io::Result<File> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        File::create(path)
    }

    fn write(&self, event_type: &str, payload: Value) {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let record = match payload {
            Value::Object(mut map) => {
                map.insert("type".into(), event_type.into());
                map.insert("timestamp".into(), timestamp.into());
                Value::Object(map)
            }
            data => json!({ "type": event_type, "timestamp": timestamp, "data": data }),
        };

        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Best effort
        let _ = serde_json::to_writer(&mut *writer, &record);
        let _ = writeln!(writer);
        let _ = writer.flush();
    }
}

impl AgentEventObserver for JsonlEventLog {
    fn on_transition(&self, transition: &StateTransition) {
        self.write(
            "transition",
            json!({
                "agent_id": transition.agent_id.as_str(),
                "from": transition.from.as_str(),
                "to": transition.to.as_str(),
                "request_id": transition.request_id.map(|id| id.to_string()),
            }),
        );
    }

    fn on_planning_complete(&self, agent_id: &AgentId, result: &PlanningResult) {
        self.write(
            "plan",
            json!({
                "agent_id": agent_id.as_str(),
                "request_id": result.request_id.to_string(),
                "tasks": result.tasks,
                "is_fallback": result.is_fallback,
                "fallback_reason": result.fallback_reason.map(|r| r.as_str().to_string()),
                "source": result.served_from_cache.as_str(),
                "latency_ms": result.latency.as_millis() as u64,
                "attempts": result.attempts,
            }),
        );
    }

    fn on_rejected(&self, agent_id: &AgentId, reason: &str) {
        self.write(
            "rejected",
            json!({
                "agent_id": agent_id.as_str(),
                "reason": reason,
            }),
        );
    }
}

impl Drop for JsonlEventLog {
    fn drop(&mut self) {
        let writer = self.writer.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner_application::PlannerMetrics;
    use planner_domain::{AgentState, FallbackReason, RequestId, Task};
    use std::time::Duration;

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_writes_one_record_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let log = JsonlEventLog::new(&path).unwrap();
        let agent = AgentId::new("miner-1");
        let request_id = RequestId::generate();

        log.on_transition(&StateTransition {
            agent_id: agent.clone(),
            from: AgentState::Idle,
            to: AgentState::Planning,
            request_id: Some(request_id),
        });
        log.on_planning_complete(
            &agent,
            &PlanningResult::fallback(
                request_id,
                vec![Task::new("wait")],
                FallbackReason::CircuitOpen,
                Duration::from_millis(3),
                0,
            ),
        );
        log.on_rejected(&agent, "already busy");
        drop(log);

        let records = read_lines(&path);
        assert_eq!(records.len(), 3);
        for record in &records {
            assert!(record.get("timestamp").is_some());
            assert_eq!(record["agent_id"], "miner-1");
        }

        assert_eq!(records[0]["type"], "transition");
        assert_eq!(records[0]["from"], "idle");
        assert_eq!(records[0]["to"], "planning");
        assert_eq!(records[0]["request_id"], request_id.to_string());

        assert_eq!(records[1]["type"], "plan");
        assert_eq!(records[1]["is_fallback"], true);
        assert_eq!(records[1]["fallback_reason"], FallbackReason::CircuitOpen.as_str());
        assert_eq!(records[1]["tasks"][0]["kind"], "wait");

        assert_eq!(records[2]["type"], "rejected");
        assert_eq!(records[2]["reason"], "already busy");
    }

    #[test]
    fn test_records_metrics_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("metrics.jsonl");
        let log = JsonlEventLog::new(&path).unwrap();
        assert_eq!(log.path(), path.as_path());

        let metrics = PlannerMetrics::new();
        metrics.record_request();
        log.record_metrics(&metrics.snapshot());
        drop(log);

        let records = read_lines(&path);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["type"], "metrics");
        assert_eq!(records[0]["requests"], 1);
    }

    #[test]
    fn test_returns_none_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        assert!(JsonlEventLog::new(blocker.join("events.jsonl")).is_none());
    }
}

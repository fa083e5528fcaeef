//! Logging infrastructure — structured agent event logging.
//!
//! Provides [`JsonlEventLog`], a JSONL file writer that implements the
//! [`AgentEventObserver`](planner_application::AgentEventObserver) port.

mod jsonl_event_log;

pub use jsonl_event_log::JsonlEventLog;

//! Ports (interfaces) for external dependencies
//!
//! Ports define the boundaries between the application layer and
//! infrastructure. Adapters in the infrastructure layer implement these.

pub mod agent_events;
pub mod planning_transport;

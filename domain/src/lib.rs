//! Domain layer for agent-planner
//!
//! This crate contains the entities, value objects and pure logic of the
//! planning pipeline. It has no dependencies on runtimes, transports or
//! configuration files.
//!
//! # Core Concepts
//!
//! ## Agent lifecycle
//!
//! Every agent moves through [`AgentState`]s under the control of an
//! [`AgentStateMachine`]: `Idle → Planning → Executing → Completed → Idle`,
//! with `Paused` around execution and `Failed` reachable from anywhere.
//!
//! ## Plans
//!
//! A goal becomes a [`PlanningRequest`]; its outcome is a [`PlanningResult`]
//! holding an ordered list of opaque [`Task`]s, tagged with where it came
//! from ([`CacheSource`]) and whether it is a degraded fallback plan.
//!
//! ## Embeddings
//!
//! [`TextEmbedder`] implementations turn goal text into an
//! [`EmbeddingVector`] so paraphrased goals can reuse earlier plans.

pub mod agent;
pub mod core;
pub mod embedding;
pub mod util;

// Re-export commonly used types
pub use agent::{
    entities::{CacheSource, FallbackReason, PlanningRequest, PlanningResult, Task},
    fallback::FallbackPlanner,
    plan_parser::{ParsedPlan, parse_plan, parse_plan_json},
    state::AgentState,
    state_machine::{AgentStateMachine, StateTransition, TransitionError},
    value_objects::{AgentId, EntryId, RequestId},
};
pub use core::error::DomainError;
pub use embedding::{EmbeddingVector, NgramEmbedder, TextEmbedder};
pub use util::{normalize_text, truncate_str};

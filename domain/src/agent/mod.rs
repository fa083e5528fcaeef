//! Agent lifecycle and planning entities

pub mod entities;
pub mod fallback;
pub mod plan_parser;
pub mod state;
pub mod state_machine;
pub mod value_objects;

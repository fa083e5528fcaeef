//! Use cases for the planning pipeline

pub mod planning_coordinator;
pub mod planning_hub;
pub mod resilient_client;
pub mod services;

//! Domain error types

use crate::agent::state_machine::TransitionError;
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid state transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

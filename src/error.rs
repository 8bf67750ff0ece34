//! Error types.
//!
//! Construction failures ([`ModelError`]) abort the whole exploration run.
//! Query failures ([`QueryError`]) are scoped to a single query.
//! Broken internal invariants are not errors: they panic.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("capacity of {resource} exceeded (capacity: {capacity})")]
    CapacityExceeded { resource: &'static str, capacity: usize },

    #[error("state {state} has no outgoing transitions and deadlocks are not allowed")]
    Deadlock { state: usize },

    #[error("model is nondeterministic: expected {expected} choices on the replayed path, but {actual} were made")]
    Nondeterminism { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unsupported query: {0}")]
    Unsupported(String),

    #[error("unknown state label '{0}'")]
    UnknownLabel(String),
}

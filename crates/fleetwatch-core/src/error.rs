//! Error types for fleetwatch operations.

use std::time::Duration;

use thiserror::Error;

use crate::types::LifecycleState;

/// Result type alias for fleetwatch operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Operation-level errors surfaced to callers.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("worker not found: {0}")]
    NotFound(String),

    #[error("worker already exists: {0}")]
    AlreadyExists(String),

    #[error("cannot {operation} worker {worker} while {state}")]
    InvalidState {
        worker: String,
        state: LifecycleState,
        operation: &'static str,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{operation} of worker {worker} timed out after {timeout:?}")]
    Timeout {
        worker: String,
        operation: &'static str,
        timeout: Duration,
    },

    #[error("driver error for worker {worker}: {message}")]
    Driver { worker: String, message: String },

    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),
}

/// Failure of a single probe or sub-check.
///
/// These are folded into health results rather than propagated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("http error: {0}")]
    Http(String),

    #[error("sampler error: {0}")]
    Sampler(String),

    #[error("not supported by this prober: {0}")]
    Unsupported(&'static str),
}

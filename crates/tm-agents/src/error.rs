//! Control-loop error type.

use thiserror::Error;

use tm_events::EventError;
use tm_protocol::ProtocolError;
use tm_spatial::SpatialError;

/// Failures surfaced to a control loop.  None of them is fatal: the loop
/// logs the error, drops its plan and carries on at the next tick.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("routing: {0}")]
    Spatial(#[from] SpatialError),

    #[error("messaging: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("incident: {0}")]
    Incident(#[from] EventError),
}

pub type ControlResult<T> = Result<T, ControlError>;

//! Spatial-subsystem error type.

use thiserror::Error;

use tm_core::{GridPos, Segment};

/// Errors produced by `tm-spatial`.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The goal cannot be reached through unblocked segments.  Callers
    /// recover by taking a random-walk step.
    #[error("no path from {from} to {to}")]
    NoPath { from: GridPos, to: GridPos },

    #[error("node {0} not found in network")]
    InvalidNode(GridPos),

    #[error("{from} and {to} are not joined by a segment")]
    NotAdjacent { from: GridPos, to: GridPos },

    #[error("base cost {cost} of {segment} must be finite and >= 1")]
    InvalidCost { segment: Segment, cost: f64 },

    #[error("capacity of {segment} must be >= 1")]
    InvalidCapacity { segment: Segment },
}

pub type SpatialResult<T> = Result<T, SpatialError>;

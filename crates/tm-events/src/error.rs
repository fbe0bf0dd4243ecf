//! Incident-store error type.

use thiserror::Error;

use tm_core::Segment;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("severity {severity} on {segment} must be a finite value >= 0")]
    InvalidSeverity { segment: Segment, severity: f64 },
}

pub type EventResult<T> = Result<T, EventError>;

//! Engine-wide base error type.
//!
//! Sub-crates define their own error enums and either convert into
//! `CoreError` or wrap it as one variant, whichever keeps error sites clean.

use thiserror::Error;

use crate::GridPos;

/// The top-level error type for `tm-core`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("node {0} is not part of the road network")]
    InvalidNode(GridPos),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Shorthand result type for `tm-core`.
pub type CoreResult<T> = Result<T, CoreError>;

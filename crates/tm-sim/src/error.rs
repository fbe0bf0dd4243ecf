use thiserror::Error;
use tokio::task::JoinError;

use tm_core::CoreError;
use tm_spatial::SpatialError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("road network: {0}")]
    Spatial(#[from] SpatialError),

    #[error("cannot place {needed} vehicles on {free} free nodes")]
    Placement {
        needed: usize,
        free:   usize,
    },

    #[error("task failed: {0}")]
    Join(#[from] JoinError),
}

pub type SimResult<T> = Result<T, SimError>;

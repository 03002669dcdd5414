//! Engine error types.

use alertgrid_kapacitor::NodeError;
use alertgrid_ring::RingError;
use alertgrid_tick::TickError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no alerting nodes available")]
    EmptyRing,

    #[error("node {0} has no live client")]
    NodeUnavailable(String),

    #[error("task {0} is not owned by alertgrid")]
    ForeignTask(String),

    #[error("failed to generate script for {version}: {source}")]
    Tick {
        version: String,
        #[source]
        source: TickError,
    },

    #[error(transparent)]
    Node(#[from] NodeError),
}

impl From<RingError> for EngineError {
    fn from(err: RingError) -> Self {
        match err {
            RingError::Empty => EngineError::EmptyRing,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

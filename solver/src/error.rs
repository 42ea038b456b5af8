//! Error types for solver operations.

use gauss_types::{MatrixError, NodeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("link error: {0}")]
    Link(#[from] gauss_link::Error),

    #[error("matrix error: {0}")]
    Matrix(#[from] MatrixError),

    #[error("matrix is singular at step {step}")]
    SingularMatrix { step: usize },

    #[error("no worker nodes available")]
    NoNodesAvailable,

    #[error("node {0} became unavailable")]
    NodeUnavailable(NodeId),

    #[error("request rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, Error>;

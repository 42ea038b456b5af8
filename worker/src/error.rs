//! Error types for worker nodes.

use gauss_types::MatrixError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("matrix error: {0}")]
    Matrix(#[from] MatrixError),
}

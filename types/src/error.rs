//! Error types for the shared model.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatrixError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index out of range: {axis} {index} (limit {limit})")]
    IndexError {
        axis: &'static str,
        index: usize,
        limit: usize,
    },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failure to turn wire bytes back into a [`crate::Message`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown message tag {0}")]
    UnknownTag(u16),

    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

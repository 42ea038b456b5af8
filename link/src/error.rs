//! Error types for link operations.

use gauss_types::{DecodeError, NodeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("could not connect to {addr} after {attempts} attempts")]
    ConnectFailed { addr: String, attempts: usize },

    #[error("node {0} is unavailable")]
    NodeUnavailable(NodeId),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("remote failure: {0}")]
    Remote(String),

    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),

    #[error("timed out waiting for {0}")]
    TimedOut(String),
}

impl Error {
    /// True when the link itself is broken and the peer should be dropped.
    /// A timeout counts: the stream position is unknown afterwards.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Json(_)
                | Error::ConnectionClosed
                | Error::FrameTooLarge(_)
                | Error::TimedOut(_)
        )
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Json(e) => Error::Json(e),
            DecodeError::UnknownTag(tag) => Error::ProtocolError(format!("unknown message tag {tag}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

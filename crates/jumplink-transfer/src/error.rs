use thiserror::Error;

use jumplink_protocol::{ProtocolError, TransportError};

/// Errors a single send or receive session can fail with. All are fatal
/// to that session; the enclosing connection/tunnel outlive it.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("file name must not contain '|': {0:?}")]
    InvalidFileName(String),

    #[error("declared size {declared} does not match delivered byte count {delivered}")]
    SizeMismatch { declared: u64, delivered: u64 },

    #[error("unexpected frame type during payload phase")]
    UnexpectedFrameType,

    #[error("peer reported failure")]
    PeerReportedFailure,

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub fn filesystem(path: impl Into<String>, source: std::io::Error) -> Self {
        TransferError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

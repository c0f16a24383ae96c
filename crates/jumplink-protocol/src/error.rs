use thiserror::Error;

/// Errors surfaced by the [`crate::Transport`] layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport io error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                TransportError::Timeout(std::time::Duration::default())
            }
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                TransportError::Closed
            }
            _ => TransportError::Io(err),
        }
    }
}

/// Errors surfaced while decoding or encoding frames on the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed length header: {0:?}")]
    MalformedLength(Vec<u8>),

    #[error("malformed frame header {0:?}: expected \"TYPE|SIZE\"")]
    MalformedHeader(String),

    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    #[error("negative or unparsable payload size: {0}")]
    InvalidSize(String),

    #[error("payload size {size} exceeds MAX_FRAME ({max})")]
    FrameTooLarge { size: usize, max: usize },
}

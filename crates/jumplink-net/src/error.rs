use thiserror::Error;

use jumplink_protocol::TransportError;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("no addresses resolved for {0}:{1}")]
    NoAddresses(String, u16),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept loop failed: {0}")]
    Accept(#[source] std::io::Error),
}

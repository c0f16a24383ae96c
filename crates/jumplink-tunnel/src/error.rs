use thiserror::Error;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("failed to spawn ssh child process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ssh host key verification failed")]
    HostKeyVerificationFailed,

    #[error("ssh authentication was rejected (permission denied)")]
    AuthFailed,

    #[error("connection to the jump host was refused")]
    ConnectionRefused,

    #[error("timed out waiting for a response from the ssh child process")]
    PromptTimeout,

    #[error("ssh child process exited before the tunnel came up")]
    UnexpectedEof,

    #[error("tunnel process was not alive after the stabilization window")]
    NotAlive,

    #[error("password authentication requested but no password was supplied")]
    MissingPassword,

    #[error("io error while driving the ssh child process: {0}")]
    Io(#[from] std::io::Error),
}

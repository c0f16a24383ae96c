//! Bidirectional, blocking byte stream abstraction.
//!
//! [`Transport`] is the one seam every other layer builds on: a TCP
//! connection, an in-memory pipe for tests, or (conceivably) a TLS stream
//! all look the same from here up.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::TransportError;

/// Default deadline for a single `read_exact`/`write_all` call.
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(30);
/// Default deadline for establishing a new connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which socket buffer a [`Transport::tune_buffer`] hint targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    Send,
    Recv,
}

/// A full-duplex byte stream with read-exactly / write-all semantics.
///
/// Implementations must make `close` idempotent and must cause any
/// in-flight `read_exact`/`write_all` (on another thread) to fail rather
/// than hang once `close` has been called.
pub trait Transport: Send {
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, TransportError>;
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;

    /// Hint the OS socket buffer for `role` towards `size`. Implementations
    /// that have no such buffer (e.g. the in-memory mock) are a no-op.
    /// Failure to apply the hint is logged, never raised.
    fn tune_buffer(&mut self, role: BufferRole, size: usize);
}

/// [`Transport`] backed by a `std::net::TcpStream`.
pub struct TcpTransport {
    stream: TcpStream,
    closed: Arc<AtomicBool>,
    current_snd_buf: usize,
    current_rcv_buf: usize,
    data_timeout: Duration,
}

impl TcpTransport {
    /// Wrap an already-connected stream. Applies the default per-call
    /// deadline and an initial socket buffer size.
    pub fn new(stream: TcpStream, initial_buffer_size: usize) -> std::io::Result<Self> {
        stream.set_read_timeout(Some(DEFAULT_DATA_TIMEOUT))?;
        stream.set_write_timeout(Some(DEFAULT_DATA_TIMEOUT))?;
        stream.set_nodelay(true)?;

        let sock_ref = socket2::SockRef::from(&stream);
        let mut current_snd_buf = initial_buffer_size;
        if let Err(err) = sock_ref.set_send_buffer_size(initial_buffer_size) {
            tracing::warn!("failed to set initial SNDBUF to {initial_buffer_size}: {err}");
            current_snd_buf = sock_ref
                .send_buffer_size()
                .unwrap_or(initial_buffer_size);
        }
        let mut current_rcv_buf = initial_buffer_size;
        if let Err(err) = sock_ref.set_recv_buffer_size(initial_buffer_size) {
            tracing::warn!("failed to set initial RCVBUF to {initial_buffer_size}: {err}");
            current_rcv_buf = sock_ref
                .recv_buffer_size()
                .unwrap_or(initial_buffer_size);
        }

        Ok(Self {
            stream,
            closed: Arc::new(AtomicBool::new(false)),
            current_snd_buf,
            current_rcv_buf,
            data_timeout: DEFAULT_DATA_TIMEOUT,
        })
    }

    /// Connect to `addr`, honoring `connect_timeout`, then wrap the stream.
    pub fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        initial_buffer_size: usize,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
        Ok(Self::new(stream, initial_buffer_size)?)
    }

    /// Per-call deadline for data operations (read_exact/write_all).
    pub fn set_data_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        self.data_timeout = timeout;
        Ok(())
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    fn closed_or_timeout(&self, err: std::io::Error) -> TransportError {
        use std::io::ErrorKind;
        if self.closed.load(Ordering::Acquire) {
            return TransportError::Closed;
        }
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                TransportError::Timeout(self.data_timeout)
            }
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                TransportError::Closed
            }
            _ => TransportError::Io(err),
        }
    }
}

impl Transport for TcpTransport {
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).map_err(|err| {
            self.closed_or_timeout(err)
        })?;
        Ok(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.stream.write_all(data).map_err(|err| self.closed_or_timeout(err))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Unblocks any in-flight read/write on another thread sharing this fd.
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        Ok(())
    }

    fn tune_buffer(&mut self, role: BufferRole, size: usize) {
        let current = match role {
            BufferRole::Send => self.current_snd_buf,
            BufferRole::Recv => self.current_rcv_buf,
        };
        if current == 0 || (size as f64 - current as f64).abs() <= current as f64 * 0.1 {
            return;
        }
        let sock_ref = socket2::SockRef::from(&self.stream);
        let result = match role {
            BufferRole::Send => sock_ref.set_send_buffer_size(size),
            BufferRole::Recv => sock_ref.set_recv_buffer_size(size),
        };
        match result {
            Ok(()) => match role {
                BufferRole::Send => self.current_snd_buf = size,
                BufferRole::Recv => self.current_rcv_buf = size,
            },
            Err(err) => tracing::debug!("failed to tune {role:?} buffer to {size}: {err}"),
        }
    }
}

/// In-memory [`Transport`] used by tests: two halves joined by bounded
/// channels, so a handshake or chunk-engine test can run without a real
/// socket.
pub struct PipeTransport {
    tx: crossbeam_channel::Sender<Vec<u8>>,
    rx: crossbeam_channel::Receiver<Vec<u8>>,
    pending: Vec<u8>,
    closed: bool,
}

/// Build a connected pair of [`PipeTransport`]s.
pub fn pipe_pair() -> (PipeTransport, PipeTransport) {
    let (a_tx, a_rx) = crossbeam_channel::unbounded();
    let (b_tx, b_rx) = crossbeam_channel::unbounded();
    (
        PipeTransport {
            tx: a_tx,
            rx: b_rx,
            pending: Vec::new(),
            closed: false,
        },
        PipeTransport {
            tx: b_tx,
            rx: a_rx,
            pending: Vec::new(),
            closed: false,
        },
    )
}

impl Transport for PipeTransport {
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        while self.pending.len() < n {
            match self.rx.recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(_) => return Err(TransportError::Closed),
            }
        }
        Ok(self.pending.drain(..n).collect())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(data.to_vec())
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }

    fn tune_buffer(&mut self, _role: BufferRole, _size: usize) {}
}

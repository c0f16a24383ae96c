//! Client-side `connect` and server-side thread-per-connection accept
//! loop, both producing [`jumplink_protocol::Transport`] instances.

pub mod error;

use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use tracing::{debug, info, warn};

use jumplink_protocol::{TcpTransport, Transport, DEFAULT_CONNECT_TIMEOUT};

pub use error::ConnectionError;

const LISTEN_BACKLOG: i32 = 5;

/// Connects to a remote host/port with a bounded connect timeout,
/// returning a ready-to-use [`Transport`].
pub struct ConnectionManager {
    connect_timeout: Duration,
    initial_buffer_size: usize,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            initial_buffer_size: 64 * 1024,
        }
    }
}

impl ConnectionManager {
    pub fn new(connect_timeout: Duration, initial_buffer_size: usize) -> Self {
        Self {
            connect_timeout,
            initial_buffer_size,
        }
    }

    pub fn connect(&self, host: &str, port: u16) -> Result<TcpTransport, ConnectionError> {
        let addr = resolve_one(host, port)?;
        debug!(%addr, "connecting");
        Ok(TcpTransport::connect(
            addr,
            self.connect_timeout,
            self.initial_buffer_size,
        )?)
    }
}

fn resolve_one(host: &str, port: u16) -> Result<SocketAddr, ConnectionError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|source| ConnectionError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| ConnectionError::NoAddresses(host.to_string(), port))
}

/// Accepts connections on `0.0.0.0:port`, one OS thread per connection,
/// and hands each one to a caller-supplied handler.
pub struct Server {
    listener: TcpListener,
    stop_flag: Arc<AtomicBool>,
    workers: Arc<Mutex<Vec<Worker>>>,
    initial_buffer_size: usize,
}

/// A spawned connection handler thread, plus a handle on its raw socket
/// so `stop()` can force any in-flight read/write to fail rather than
/// waiting out the handler's own timeouts.
struct Worker {
    handle: JoinHandle<()>,
    stream: TcpStream,
}

impl Server {
    /// Bind with address reuse enabled and a small backlog.
    pub fn bind(port: u16, initial_buffer_size: usize) -> Result<Self, ConnectionError> {
        let addr: SocketAddr = format!("0.0.0.0:{port}").parse().expect("valid socket addr");
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).map_err(|source| {
            ConnectionError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        socket
            .set_reuse_address(true)
            .map_err(|source| ConnectionError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        socket
            .bind(&addr.into())
            .map_err(|source| ConnectionError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| ConnectionError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        socket.set_nonblocking(true).ok();

        Ok(Self {
            listener: socket.into(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            workers: Arc::new(Mutex::new(Vec::new())),
            initial_buffer_size,
        })
    }

    pub fn local_port(&self) -> std::io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accept connections until `stop()` is called, spawning `handler`
    /// on its own thread for each accepted socket.
    pub fn serve<F>(&self, handler: F)
    where
        F: Fn(Box<dyn Transport>, SocketAddr) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let accept_poll = Duration::from_millis(100);

        while !self.stop_flag.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.spawn_worker(stream, peer, handler.clone());
                }
                Err(err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.kind() == std::io::ErrorKind::TimedOut =>
                {
                    std::thread::sleep(accept_poll);
                }
                Err(err) => {
                    warn!("accept failed: {err}");
                    std::thread::sleep(accept_poll);
                }
            }
        }
    }

    fn spawn_worker<F>(&self, stream: TcpStream, peer: SocketAddr, handler: Arc<F>)
    where
        F: Fn(Box<dyn Transport>, SocketAddr) + Send + Sync + 'static,
    {
        let initial_buffer_size = self.initial_buffer_size;
        let shutdown_handle = match stream.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                warn!(%peer, "failed to clone accepted socket for shutdown tracking: {err}");
                return;
            }
        };
        let handle = std::thread::spawn(move || {
            let _ = stream.set_nonblocking(false);
            match TcpTransport::new(stream, initial_buffer_size) {
                Ok(transport) => handler(Box::new(transport), peer),
                Err(err) => warn!(%peer, "failed to wrap accepted socket: {err}"),
            }
        });
        self.workers
            .lock()
            .expect("workers mutex poisoned")
            .push(Worker {
                handle,
                stream: shutdown_handle,
            });
    }

    /// Signal the accept loop to stop, cancel every in-flight connection's
    /// socket so its `Transport` fails with `TransportClosed` instead of
    /// running out its own timeout, then join workers with a bounded wait
    /// before abandoning any stragglers (their threads keep running
    /// detached; `stop` just stops waiting on them).
    pub fn stop(&self, join_timeout: Duration) {
        self.stop_flag.store(true, Ordering::Release);

        let mut workers: Vec<Worker> = {
            let mut guard = self.workers.lock().expect("workers mutex poisoned");
            guard.drain(..).collect()
        };

        for worker in &workers {
            if let Err(err) = worker.stream.shutdown(std::net::Shutdown::Both) {
                debug!("failed to shut down an in-flight connection: {err}");
            }
        }

        let deadline = std::time::Instant::now() + join_timeout;
        let poll = Duration::from_millis(20);
        loop {
            if workers.is_empty() {
                return;
            }
            if std::time::Instant::now() >= deadline {
                info!(count = workers.len(), "abandoning unfinished workers past join deadline");
                return;
            }
            let mut still_running = Vec::new();
            for worker in workers {
                if worker.handle.is_finished() {
                    if worker.handle.join().is_err() {
                        warn!("a connection worker panicked");
                    }
                } else {
                    still_running.push(worker);
                }
            }
            workers = still_running;
            if !workers.is_empty() {
                std::thread::sleep(poll);
            }
        }
    }
}

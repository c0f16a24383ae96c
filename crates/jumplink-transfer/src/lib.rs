//! Single-file transfer semantics built on top of `jumplink-protocol`:
//! handshake, adaptive chunking, and the buffer/latency models that
//! drive chunk sizing.

pub mod buffer;
pub mod chunk;
pub mod error;
pub mod handshake;
pub mod latency;
pub mod message;
pub mod service;

pub use buffer::{BufferManager, BufferMetrics};
pub use chunk::ChunkEngine;
pub use error::TransferError;
pub use handshake::{FileMeta, ReceiverHandshake, SenderHandshake};
pub use latency::{classify, LatencyProbe, NetworkQuality};
pub use message::{MessageClient, MessageServer};
pub use service::{FileTransferService, NetworkOptimizationMode};

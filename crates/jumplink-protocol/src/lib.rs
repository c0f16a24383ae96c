//! Wire-level framing and transport for jumplink: a length-prefixed,
//! typed-frame codec (`len8 ∥ "TYPE|SIZE" ∥ payload`) over a blocking,
//! full-duplex byte stream.

pub mod error;
pub mod frame;
pub mod transport;

pub use error::{ProtocolError, TransportError};
pub use frame::{Frame, FrameCodec, FrameType, DEFAULT_MAX_FRAME, LEN_PREFIX_SIZE};
pub use transport::{
    pipe_pair, BufferRole, PipeTransport, TcpTransport, Transport, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_DATA_TIMEOUT,
};

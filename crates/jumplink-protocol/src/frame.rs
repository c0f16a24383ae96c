//! Typed, length-prefixed frames: `len8 ∥ "TYPE|SIZE" ∥ payload`.

use crate::error::ProtocolError;
use crate::transport::Transport;

/// Length in bytes of the fixed-width ASCII decimal length prefix.
pub const LEN_PREFIX_SIZE: usize = 8;

/// Default ceiling on a single frame's payload size (16 MiB).
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

const HEADER_DELIMITER: &str = "|";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Msg,
    File,
}

impl FrameType {
    fn as_str(self) -> &'static str {
        match self {
            FrameType::Msg => "MSG",
            FrameType::File => "FILE",
        }
    }

    fn parse(s: &str) -> Result<Self, ProtocolError> {
        match s {
            "MSG" => Ok(FrameType::Msg),
            "FILE" => Ok(FrameType::File),
            other => Err(ProtocolError::UnknownFrameType(other.to_string())),
        }
    }
}

/// One frame: a typed, length-prefixed unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn msg(text: impl Into<String>) -> Self {
        Frame {
            frame_type: FrameType::Msg,
            payload: text.into().into_bytes(),
        }
    }

    pub fn file(payload: Vec<u8>) -> Self {
        Frame {
            frame_type: FrameType::File,
            payload,
        }
    }

    /// Decode a MSG frame's payload as UTF-8 text.
    pub fn as_text(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload)
            .map_err(|_| ProtocolError::MalformedHeader("non-utf8 MSG payload".to_string()))
    }

    fn encode(&self, max_frame: usize) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > max_frame {
            return Err(ProtocolError::FrameTooLarge {
                size: self.payload.len(),
                max: max_frame,
            });
        }
        let header = format!(
            "{}{}{}",
            self.frame_type.as_str(),
            HEADER_DELIMITER,
            self.payload.len()
        );
        let header_bytes = header.into_bytes();
        let len_prefix = format!("{:0width$}", header_bytes.len(), width = LEN_PREFIX_SIZE);

        let mut out = Vec::with_capacity(LEN_PREFIX_SIZE + header_bytes.len() + self.payload.len());
        out.extend_from_slice(len_prefix.as_bytes());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// Encodes and decodes [`Frame`]s over a [`Transport`].
pub struct FrameCodec {
    max_frame: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

impl FrameCodec {
    pub fn new(max_frame: usize) -> Self {
        Self { max_frame }
    }

    pub fn write(&self, transport: &mut dyn Transport, frame: &Frame) -> Result<(), ProtocolError> {
        let bytes = frame.encode(self.max_frame)?;
        transport.write_all(&bytes)?;
        Ok(())
    }

    pub fn read(&self, transport: &mut dyn Transport) -> Result<Frame, ProtocolError> {
        let len_bytes = transport.read_exact(LEN_PREFIX_SIZE)?;
        let len_str = std::str::from_utf8(&len_bytes)
            .map_err(|_| ProtocolError::MalformedLength(len_bytes.clone()))?;
        let header_len: usize = len_str
            .trim()
            .parse()
            .map_err(|_| ProtocolError::MalformedLength(len_bytes.clone()))?;

        let header_bytes = transport.read_exact(header_len)?;
        let header = std::str::from_utf8(&header_bytes)
            .map_err(|_| ProtocolError::MalformedHeader("non-utf8 header".to_string()))?;
        let (type_str, size_str) = header
            .split_once(HEADER_DELIMITER)
            .ok_or_else(|| ProtocolError::MalformedHeader(header.to_string()))?;

        let frame_type = FrameType::parse(type_str)?;
        let size: i64 = size_str
            .parse()
            .map_err(|_| ProtocolError::InvalidSize(size_str.to_string()))?;
        if size < 0 {
            return Err(ProtocolError::InvalidSize(size_str.to_string()));
        }
        let size = size as usize;
        if size > self.max_frame {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame,
            });
        }

        let payload = transport.read_exact(size)?;
        Ok(Frame { frame_type, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{pipe_pair, Transport};

    #[test]
    fn round_trips_a_msg_frame() {
        let (mut a, mut b) = pipe_pair();
        let codec = FrameCodec::default();
        let frame = Frame::msg("READY");
        codec.write(&mut a, &frame).unwrap();
        let decoded = codec.read(&mut b).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn round_trips_a_file_frame_with_binary_payload() {
        let (mut a, mut b) = pipe_pair();
        let codec = FrameCodec::default();
        let frame = Frame::file(vec![0xA5; 2048]);
        codec.write(&mut a, &frame).unwrap();
        let decoded = codec.read(&mut b).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn round_trips_a_zero_byte_file_frame() {
        let (mut a, mut b) = pipe_pair();
        let codec = FrameCodec::default();
        let frame = Frame::file(Vec::new());
        codec.write(&mut a, &frame).unwrap();
        let decoded = codec.read(&mut b).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn decodes_exactly_n_frames_with_no_residual_bytes() {
        let (mut a, mut b) = pipe_pair();
        let codec = FrameCodec::default();
        let frames = vec![
            Frame::msg("note.txt|13"),
            Frame::msg("READY"),
            Frame::file(b"hello world\n!".to_vec()),
            Frame::msg("SUCCESS"),
        ];
        for f in &frames {
            codec.write(&mut a, f).unwrap();
        }
        for expected in &frames {
            let decoded = codec.read(&mut b).unwrap();
            assert_eq!(&decoded, expected);
        }
    }

    #[test]
    fn rejects_unknown_frame_type() {
        let (mut a, mut b) = pipe_pair();
        a.write_all(b"00000005BAD|0").unwrap();
        let codec = FrameCodec::default();
        let err = codec.read(&mut b).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownFrameType(_)));
    }

    #[test]
    fn rejects_malformed_length_prefix() {
        let (mut a, mut b) = pipe_pair();
        a.write_all(b"not-a-ln").unwrap();
        let codec = FrameCodec::default();
        let err = codec.read(&mut b).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedLength(_)));
    }

    #[test]
    fn rejects_frame_over_max_size() {
        let (mut a, mut b) = pipe_pair();
        let codec = FrameCodec::new(16);
        // Bypass encode()'s own check by writing a header claiming a bigger size.
        let header = "FILE|17";
        let prefix = format!("{:08}", header.len());
        a.write_all(prefix.as_bytes()).unwrap();
        a.write_all(header.as_bytes()).unwrap();
        let err = codec.read(&mut b).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }

    #[test]
    fn single_frame_at_exactly_max_size() {
        let (mut a, mut b) = pipe_pair();
        let codec = FrameCodec::new(32);
        let frame = Frame::file(vec![1u8; 32]);
        codec.write(&mut a, &frame).unwrap();
        let decoded = codec.read(&mut b).unwrap();
        assert_eq!(decoded, frame);
    }
}

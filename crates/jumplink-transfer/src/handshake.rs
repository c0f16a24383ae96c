//! Control-message exchange that precedes and follows a file's payload
//! phase: META/READY on the way in, STATUS/FINAL on the way out.

use jumplink_protocol::{Frame, FrameCodec, Transport};

use crate::error::TransferError;

const READY: &str = "READY";
const SUCCESS: &str = "SUCCESS";
const FAIL: &str = "FAIL";

/// One file's declared name and size, as carried by a META message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
}

impl FileMeta {
    pub fn new(name: impl Into<String>, size: u64) -> Result<Self, TransferError> {
        let name = name.into();
        if name.contains('|') {
            return Err(TransferError::InvalidFileName(name));
        }
        Ok(Self { name, size })
    }

    fn encode(&self) -> String {
        format!("{}|{}", self.name, self.size)
    }

    fn decode(text: &str) -> Result<Self, TransferError> {
        let (name, size) = text
            .rsplit_once('|')
            .ok_or_else(|| TransferError::InvalidFileName(text.to_string()))?;
        let size: u64 = size
            .parse()
            .map_err(|_| TransferError::InvalidFileName(text.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            size,
        })
    }
}

/// Drives the sender side of the control-message protocol: `META →
/// WAIT_READY` before the payload, `STATUS → WAIT_FINAL` after.
pub struct SenderHandshake<'a> {
    codec: &'a FrameCodec,
}

impl<'a> SenderHandshake<'a> {
    pub fn new(codec: &'a FrameCodec) -> Self {
        Self { codec }
    }

    pub fn send_meta(
        &self,
        transport: &mut dyn Transport,
        meta: &FileMeta,
    ) -> Result<(), TransferError> {
        self.codec
            .write(transport, &Frame::msg(meta.encode()))?;
        Ok(())
    }

    pub fn await_ready(&self, transport: &mut dyn Transport) -> Result<(), TransferError> {
        let frame = self.codec.read(transport)?;
        if frame.as_text()? != READY {
            return Err(TransferError::UnexpectedFrameType);
        }
        Ok(())
    }

    pub fn send_status(
        &self,
        transport: &mut dyn Transport,
        success: bool,
    ) -> Result<(), TransferError> {
        let text = if success { SUCCESS } else { FAIL };
        self.codec.write(transport, &Frame::msg(text))?;
        Ok(())
    }

    pub fn await_final(&self, transport: &mut dyn Transport) -> Result<bool, TransferError> {
        let frame = self.codec.read(transport)?;
        Ok(frame.as_text()? == SUCCESS)
    }
}

/// Drives the receiver side: `WAIT_META → SEND_READY` before the
/// payload, `WAIT_STATUS → SEND_FINAL` after.
pub struct ReceiverHandshake<'a> {
    codec: &'a FrameCodec,
}

impl<'a> ReceiverHandshake<'a> {
    pub fn new(codec: &'a FrameCodec) -> Self {
        Self { codec }
    }

    pub fn await_meta(&self, transport: &mut dyn Transport) -> Result<FileMeta, TransferError> {
        let frame = self.codec.read(transport)?;
        FileMeta::decode(frame.as_text()?)
    }

    pub fn send_ready(&self, transport: &mut dyn Transport) -> Result<(), TransferError> {
        self.codec.write(transport, &Frame::msg(READY))?;
        Ok(())
    }

    pub fn await_status(&self, transport: &mut dyn Transport) -> Result<bool, TransferError> {
        let frame = self.codec.read(transport)?;
        Ok(frame.as_text()? == SUCCESS)
    }

    pub fn send_final(
        &self,
        transport: &mut dyn Transport,
        success: bool,
    ) -> Result<(), TransferError> {
        let text = if success { SUCCESS } else { FAIL };
        self.codec.write(transport, &Frame::msg(text))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jumplink_protocol::pipe_pair;

    #[test]
    fn rejects_a_file_name_containing_the_delimiter() {
        assert!(FileMeta::new("a|b.txt", 10).is_err());
    }

    #[test]
    fn meta_round_trips_through_the_wire_encoding() {
        let meta = FileMeta::new("report.csv", 4096).unwrap();
        let decoded = FileMeta::decode(&meta.encode()).unwrap();
        assert_eq!(meta, decoded);
    }

    #[test]
    fn full_pre_and_post_payload_handshake_succeeds_end_to_end() {
        let (mut sender_t, mut receiver_t) = pipe_pair();
        let codec = FrameCodec::default();
        let sender = SenderHandshake::new(&codec);
        let receiver = ReceiverHandshake::new(&codec);

        let meta = FileMeta::new("report.csv", 4096).unwrap();
        sender.send_meta(&mut sender_t, &meta).unwrap();
        let received_meta = receiver.await_meta(&mut receiver_t).unwrap();
        assert_eq!(meta, received_meta);

        receiver.send_ready(&mut receiver_t).unwrap();
        sender.await_ready(&mut sender_t).unwrap();

        sender.send_status(&mut sender_t, true).unwrap();
        let status = receiver.await_status(&mut receiver_t).unwrap();
        assert!(status);

        receiver.send_final(&mut receiver_t, true).unwrap();
        let final_ok = sender.await_final(&mut sender_t).unwrap();
        assert!(final_ok);
    }

    #[test]
    fn a_non_ready_frame_during_wait_ready_is_rejected() {
        let (mut sender_t, mut receiver_t) = pipe_pair();
        let codec = FrameCodec::default();
        let sender = SenderHandshake::new(&codec);

        codec.write(&mut receiver_t, &Frame::msg("NOT_READY")).unwrap();
        assert!(sender.await_ready(&mut sender_t).is_err());
    }
}

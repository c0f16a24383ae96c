//! Payload-phase send/receive loops: read a file in adaptively-sized
//! chunks, push each as a FILE frame, and report progress as it goes.

use std::io::{Read, Write};
use std::time::Instant;

use jumplink_protocol::{BufferRole, Frame, FrameCodec, Transport};
use jumplink_progress::{Event, ProgressBus};

use crate::buffer::BufferManager;
use crate::error::TransferError;

/// Re-tune the socket and resize the chunk target every this-many chunks.
const SAMPLE_INTERVAL: u64 = 10;

/// Drives one file's payload phase. Holds no state across files; callers
/// construct a fresh engine per transfer with a caller-chosen `task_id`.
pub struct ChunkEngine<'a> {
    codec: &'a FrameCodec,
    bus: &'a ProgressBus,
}

impl<'a> ChunkEngine<'a> {
    pub fn new(codec: &'a FrameCodec, bus: &'a ProgressBus) -> Self {
        Self { codec, bus }
    }

    /// Stream `reader` to `transport` as FILE frames, sized by `buffer`.
    pub fn send(
        &self,
        task_id: &str,
        description: &str,
        total: u64,
        reader: &mut dyn Read,
        transport: &mut dyn Transport,
        buffer: &mut BufferManager,
    ) -> Result<(), TransferError> {
        self.bus.publish(Event::TaskStarted {
            task_id: task_id.to_string(),
            description: description.to_string(),
            total,
        });

        let result = self.send_loop(task_id, reader, transport, buffer);

        match &result {
            Ok(()) => {
                self.bus.publish(Event::TaskFinished {
                    task_id: task_id.to_string(),
                    success: true,
                    description: None,
                });
            }
            Err(err) => {
                self.bus.publish(Event::TaskError {
                    task_id: task_id.to_string(),
                    message: err.to_string(),
                });
            }
        }
        result
    }

    fn send_loop(
        &self,
        task_id: &str,
        reader: &mut dyn Read,
        transport: &mut dyn Transport,
        buffer: &mut BufferManager,
    ) -> Result<(), TransferError> {
        let mut chunk_count: u64 = 0;
        loop {
            let mut chunk = vec![0u8; buffer.current_size()];
            let t0 = Instant::now();
            let read = read_up_to(reader, &mut chunk)
                .map_err(|e| TransferError::filesystem("<reader>", e))?;
            if read == 0 {
                break;
            }
            chunk.truncate(read);

            self.codec.write(transport, &Frame::file(chunk))?;
            let dt = t0.elapsed();

            self.bus.publish(Event::ProgressAdvanced {
                task_id: task_id.to_string(),
                advance: read as u64,
            });

            chunk_count += 1;
            if chunk_count % SAMPLE_INTERVAL == 0 && dt.as_secs_f64() > 0.0 {
                buffer.sample(read as u64, dt);
                let proposed = buffer.propose();
                transport.tune_buffer(BufferRole::Send, proposed);
            }
        }
        Ok(())
    }

    /// Decode FILE frames from `transport` into `writer` until exactly
    /// `expected_size` bytes have been delivered.
    pub fn receive(
        &self,
        task_id: &str,
        description: &str,
        expected_size: u64,
        writer: &mut dyn Write,
        transport: &mut dyn Transport,
        buffer: &mut BufferManager,
    ) -> Result<(), TransferError> {
        self.bus.publish(Event::TaskStarted {
            task_id: task_id.to_string(),
            description: description.to_string(),
            total: expected_size,
        });

        let result = self.receive_loop(task_id, expected_size, writer, transport, buffer);

        match &result {
            Ok(()) => {
                self.bus.publish(Event::TaskFinished {
                    task_id: task_id.to_string(),
                    success: true,
                    description: None,
                });
            }
            Err(err) => {
                self.bus.publish(Event::TaskError {
                    task_id: task_id.to_string(),
                    message: err.to_string(),
                });
            }
        }
        result
    }

    fn receive_loop(
        &self,
        task_id: &str,
        expected_size: u64,
        writer: &mut dyn Write,
        transport: &mut dyn Transport,
        buffer: &mut BufferManager,
    ) -> Result<(), TransferError> {
        let mut received: u64 = 0;
        let mut chunk_count: u64 = 0;

        while received < expected_size {
            let t0 = Instant::now();
            let frame = self.codec.read(transport)?;
            if frame.frame_type != jumplink_protocol::FrameType::File {
                return Err(TransferError::UnexpectedFrameType);
            }
            let dt = t0.elapsed();

            writer
                .write_all(&frame.payload)
                .map_err(|e| TransferError::filesystem("<writer>", e))?;
            received += frame.payload.len() as u64;

            self.bus.publish(Event::ProgressAdvanced {
                task_id: task_id.to_string(),
                advance: frame.payload.len() as u64,
            });

            chunk_count += 1;
            if chunk_count % SAMPLE_INTERVAL == 0 && dt.as_secs_f64() > 0.0 {
                buffer.sample(frame.payload.len() as u64, dt);
                let proposed = buffer.propose();
                transport.tune_buffer(BufferRole::Recv, proposed);
            }
        }

        if received != expected_size {
            return Err(TransferError::SizeMismatch {
                declared: expected_size,
                delivered: received,
            });
        }
        Ok(())
    }
}

/// Like `Read::read`, but keeps reading until `buf` is full or the
/// underlying reader reaches EOF, so a chunk is never short just because
/// one syscall returned less than requested.
fn read_up_to(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jumplink_protocol::pipe_pair;
    use std::io::Cursor;

    #[test]
    fn sends_and_receives_a_small_file_intact() {
        let (mut tx, mut rx) = pipe_pair();
        let codec = FrameCodec::default();
        let bus = ProgressBus::new();
        let engine = ChunkEngine::new(&codec, &bus);

        let data = b"hello from a jumplink test".to_vec();
        let mut reader = Cursor::new(data.clone());
        let mut send_buffer = BufferManager::new(8, 0.01);

        let data_len = data.len() as u64;
        let sent = std::thread::scope(|scope| {
            scope.spawn(|| {
                engine
                    .send("abc12345", "Sending x.bin", data_len, &mut reader, &mut tx, &mut send_buffer)
            });

            let mut out = Vec::new();
            let mut recv_buffer = BufferManager::new(8, 0.01);
            engine
                .receive(
                    "abc12345",
                    "Receiving x.bin",
                    data_len,
                    &mut out,
                    &mut rx,
                    &mut recv_buffer,
                )
                .unwrap();
            out
        });

        assert_eq!(sent, data);
    }

    #[test]
    fn a_non_file_frame_during_payload_phase_is_rejected() {
        let (mut tx, mut rx) = pipe_pair();
        let codec = FrameCodec::default();
        let bus = ProgressBus::new();
        let engine = ChunkEngine::new(&codec, &bus);

        codec.write(&mut tx, &Frame::msg("not a file frame")).unwrap();

        let mut out = Vec::new();
        let mut buffer = BufferManager::new(8, 0.01);
        let err = engine
            .receive("taskid01", "Receiving", 100, &mut out, &mut rx, &mut buffer)
            .unwrap_err();
        assert!(matches!(err, TransferError::UnexpectedFrameType));
    }

    #[test]
    fn short_delivery_is_reported_as_a_size_mismatch() {
        let (mut tx, mut rx) = pipe_pair();
        let codec = FrameCodec::default();
        let bus = ProgressBus::new();
        let engine = ChunkEngine::new(&codec, &bus);

        codec.write(&mut tx, &Frame::file(vec![1, 2, 3])).unwrap();
        tx.close().unwrap();

        let mut out = Vec::new();
        let mut buffer = BufferManager::new(8, 0.01);
        let err = engine
            .receive("taskid02", "Receiving", 10, &mut out, &mut rx, &mut buffer)
            .unwrap_err();
        assert!(matches!(err, TransferError::Protocol(_) | TransferError::Transport(_)));
    }
}

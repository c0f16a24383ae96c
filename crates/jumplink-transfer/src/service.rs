//! Top-level façade tying the handshake, chunk engine, and buffer
//! manager together into `send_file`/`receive_file` operations.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use jumplink_protocol::{FrameCodec, Transport};
use jumplink_progress::{generate_task_id, ProgressBus};

use crate::buffer::BufferManager;
use crate::chunk::ChunkEngine;
use crate::error::TransferError;
use crate::handshake::{FileMeta, ReceiverHandshake, SenderHandshake};
use crate::latency::NetworkQuality;

const DEFAULT_INITIAL_CHUNK: usize = 64 * 1024;
/// Round-trip latency assumed when no [`crate::latency::LatencyProbe`]
/// measurement is supplied.
const DEFAULT_LATENCY_S: f64 = 0.05;

/// How a [`FileTransferService`] should seed its [`BufferManager`].
pub enum NetworkOptimizationMode {
    /// Start at a fixed chunk size with a fixed latency assumption.
    Fixed { chunk_size: usize, latency_s: f64 },
    /// Seed from a measured network quality classification.
    Measured {
        quality: NetworkQuality,
        latency_s: f64,
    },
}

impl Default for NetworkOptimizationMode {
    fn default() -> Self {
        NetworkOptimizationMode::Fixed {
            chunk_size: DEFAULT_INITIAL_CHUNK,
            latency_s: DEFAULT_LATENCY_S,
        }
    }
}

impl NetworkOptimizationMode {
    fn into_buffer_manager(self) -> BufferManager {
        match self {
            NetworkOptimizationMode::Fixed {
                chunk_size,
                latency_s,
            } => BufferManager::new(chunk_size, latency_s),
            NetworkOptimizationMode::Measured { quality, latency_s } => {
                BufferManager::new(quality.initial_chunk_size(), latency_s)
            }
        }
    }
}

/// Sends and receives single files over an already-established
/// [`Transport`], handling the META/READY/STATUS/FINAL handshake and
/// progress reporting around the payload phase.
pub struct FileTransferService {
    codec: FrameCodec,
    bus: ProgressBus,
    buffer: BufferManager,
}

impl FileTransferService {
    pub fn new(bus: ProgressBus, mode: NetworkOptimizationMode) -> Self {
        Self {
            codec: FrameCodec::default(),
            bus,
            buffer: mode.into_buffer_manager(),
        }
    }

    /// Send `path` over `transport`. Runs the full sender-side state
    /// machine: META → WAIT_READY → payload → STATUS → WAIT_FINAL.
    pub fn send_file(
        &mut self,
        path: &Path,
        transport: &mut dyn Transport,
    ) -> Result<(), TransferError> {
        let metadata = fs::metadata(path)
            .map_err(|e| TransferError::filesystem(path.display().to_string(), e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))?;
        let meta = FileMeta::new(file_name, metadata.len())?;

        let handshake = SenderHandshake::new(&self.codec);
        handshake.send_meta(transport, &meta)?;
        handshake.await_ready(transport)?;

        let mut file = File::open(path)
            .map_err(|e| TransferError::filesystem(path.display().to_string(), e))?;

        let task_id = generate_task_id();
        let engine = ChunkEngine::new(&self.codec, &self.bus);
        let payload_result = engine.send(
            &task_id,
            &format!("Sending {file_name}"),
            meta.size,
            &mut file,
            transport,
            &mut self.buffer,
        );

        let own_success = payload_result.is_ok();
        handshake.send_status(transport, own_success)?;
        if !own_success {
            return payload_result;
        }

        let peer_success = handshake.await_final(transport)?;
        if !peer_success {
            return Err(TransferError::PeerReportedFailure);
        }
        Ok(())
    }

    /// Receive one file into `out_dir`, named `received_<name>`, creating
    /// `out_dir` if needed and truncating an existing destination file.
    /// Runs the full receiver-side state machine: WAIT_META → SEND_READY
    /// → payload → WAIT_STATUS → SEND_FINAL.
    pub fn receive_file(
        &mut self,
        out_dir: &Path,
        transport: &mut dyn Transport,
    ) -> Result<PathBuf, TransferError> {
        let handshake = ReceiverHandshake::new(&self.codec);
        let meta = handshake.await_meta(transport)?;

        fs::create_dir_all(out_dir)
            .map_err(|e| TransferError::filesystem(out_dir.display().to_string(), e))?;
        let dest_path = out_dir.join(format!("received_{}", meta.name));
        handshake.send_ready(transport)?;

        let file = File::create(&dest_path)
            .map_err(|e| TransferError::filesystem(dest_path.display().to_string(), e))?;
        let mut writer = BufWriter::new(file);

        let task_id = generate_task_id();
        let engine = ChunkEngine::new(&self.codec, &self.bus);
        let payload_result = engine.receive(
            &task_id,
            &format!("Receiving {}", meta.name),
            meta.size,
            &mut writer,
            transport,
            &mut self.buffer,
        );
        let own_success = payload_result.is_ok();

        let sender_status = handshake.await_status(transport)?;
        let final_success = own_success && sender_status;
        handshake.send_final(transport, final_success)?;

        if !final_success {
            return payload_result.and(Err(TransferError::PeerReportedFailure));
        }
        Ok(dest_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jumplink_protocol::pipe_pair;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn sends_and_receives_a_file_through_a_full_service_round_trip() {
        let src_dir = tempdir().unwrap();
        let src_path = src_dir.path().join("hello.txt");
        std::fs::File::create(&src_path)
            .unwrap()
            .write_all(b"the quick brown fox")
            .unwrap();

        let out_dir = tempdir().unwrap();
        let (mut sender_t, mut receiver_t) = pipe_pair();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut service =
                    FileTransferService::new(ProgressBus::new(), NetworkOptimizationMode::default());
                service.send_file(&src_path, &mut sender_t).unwrap();
            });

            let mut receiver =
                FileTransferService::new(ProgressBus::new(), NetworkOptimizationMode::default());
            let dest = receiver.receive_file(out_dir.path(), &mut receiver_t).unwrap();
            let contents = std::fs::read(&dest).unwrap();
            assert_eq!(contents, b"the quick brown fox");
            assert_eq!(dest.file_name().unwrap(), "received_hello.txt");
        });
    }

    #[test]
    fn rejects_sending_a_file_whose_name_contains_the_delimiter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a|b.txt");
        std::fs::File::create(&path).unwrap();

        let (mut tx, _rx) = pipe_pair();
        let mut service =
            FileTransferService::new(ProgressBus::new(), NetworkOptimizationMode::default());
        let err = service.send_file(&path, &mut tx).unwrap_err();
        assert!(matches!(err, TransferError::InvalidFileName(_)));
    }
}

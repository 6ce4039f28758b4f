//! Receiving side of a transfer session.
//!
//! Reads the handshake, verifies and persists chunks as they arrive,
//! and publishes the output file only once the commitment checks out.
//! Every error path leaves either nothing or an explicitly `.partial`
//! artifact — never a final-named file with unverified content.

use std::path::PathBuf;

use courier_core::commitment::CommitmentRoot;
use courier_core::config::CourierConfig;
use courier_core::error::TransferError;
use courier_core::wire::{Frame, FrameReader};
use tokio::io::AsyncRead;

use crate::reassembler::Reassembler;
use crate::store::ChunkStore;

/// Summary of a completed receive.
#[derive(Debug, Clone)]
pub struct ReceiveOutcome {
    pub sender_id: String,
    pub path: PathBuf,
    pub chunks: u64,
    pub bytes: u64,
    pub root: CommitmentRoot,
}

/// Consume one transfer conversation from `stream`.
pub async fn receive_file<S>(stream: S, config: &CourierConfig) -> Result<ReceiveOutcome, TransferError>
where
    S: AsyncRead + Unpin,
{
    let mut reader = FrameReader::new(stream);
    let sender_id = reader.handshake().await?;
    tracing::info!(sender = %sender_id, "transfer initiated");

    let store = if config.transfer.persist_chunks {
        Some(ChunkStore::open(&config.storage.chunk_root)?.for_peer(&sender_id)?)
    } else {
        None
    };

    let final_path = config.storage.output_dir.join(format!("{sender_id}.recv"));
    let mut reassembler = Reassembler::create(&final_path, config.transfer.verify)?;

    loop {
        match reader.frame().await {
            Ok(Frame::Chunk { label, payload }) => {
                // Bytes clones share the buffer; the store write below
                // happens only after the chunk passed acceptance.
                let bytes = payload.clone();
                if let Err(e) = reassembler.accept_chunk(label.index, label.fingerprint, payload) {
                    tracing::warn!(
                        sender = %sender_id,
                        index = label.index,
                        error = %e,
                        "chunk rejected, aborting session"
                    );
                    reassembler.discard();
                    return Err(e);
                }
                if let Some(store) = &store {
                    store.put(&bytes)?;
                }
                tracing::debug!(sender = %sender_id, index = label.index, len = bytes.len(), "chunk accepted");
            }
            Ok(Frame::Commitment { root }) => {
                let report = reassembler.finalize(&root)?;
                tracing::info!(
                    sender = %sender_id,
                    path = %final_path.display(),
                    chunks = report.chunks,
                    bytes = report.bytes,
                    root = %hex::encode(report.root),
                    "file received and verified"
                );
                return Ok(ReceiveOutcome {
                    sender_id,
                    path: final_path,
                    chunks: report.chunks,
                    bytes: report.bytes,
                    root: report.root,
                });
            }
            Err(e) => {
                tracing::warn!(sender = %sender_id, error = %e, "transfer aborted");
                reassembler.discard();
                return Err(e);
            }
        }
    }
}

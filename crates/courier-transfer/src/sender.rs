//! Sending side of a transfer session.
//!
//! One call covers one conversation: handshake, every chunk in index
//! order, then the commitment root as the final message. The manifest
//! and commitment index are owned by this call alone — nothing is
//! shared with concurrently running sessions.

use std::fs::File;
use std::path::Path;

use courier_core::commitment::{CommitmentIndex, CommitmentRoot};
use courier_core::config::CourierConfig;
use courier_core::error::TransferError;
use courier_core::fingerprint::fingerprint;
use courier_core::wire::{ChunkLabel, FrameWriter};
use tokio::io::AsyncWrite;

use crate::chunker::ChunkSplitter;
use crate::manifest::ChunkManifest;
use crate::store::ChunkStore;

/// Summary of a completed send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub chunks: u64,
    pub bytes: u64,
    pub root: CommitmentRoot,
}

/// Stream one file to the peer on `stream`.
pub async fn send_file<S>(
    stream: S,
    path: &Path,
    sender_id: &str,
    config: &CourierConfig,
) -> Result<SendOutcome, TransferError>
where
    S: AsyncWrite + Unpin,
{
    let source = File::open(path)?;
    let mut splitter = ChunkSplitter::new(source, config.transfer.chunk_size)?;

    let store = if config.transfer.persist_chunks {
        Some(ChunkStore::open(&config.storage.chunk_root)?.for_peer(sender_id)?)
    } else {
        None
    };

    let mut writer = FrameWriter::new(stream);
    writer.handshake(sender_id).await?;

    let mut manifest = ChunkManifest::new(config.transfer.chunk_size);
    let mut index = CommitmentIndex::new();

    while let Some(chunk) = splitter.next_chunk()? {
        let fp = fingerprint(&chunk.bytes);
        index.add(chunk.index, fp)?;
        manifest.push(fp, chunk.bytes.len() as u64);

        if let Some(store) = &store {
            store.put(&chunk.bytes)?;
        }

        let label = ChunkLabel {
            index: chunk.index,
            fingerprint: fp,
        };
        writer.chunk(&label, &chunk.bytes).await?;
        tracing::debug!(index = chunk.index, len = chunk.bytes.len(), "chunk sent");
    }

    let root = index.root();
    writer.commitment(&root).await?;

    if let Some(store) = &store {
        // Sidecar lives beside the mirrored chunks; a sealed manifest is
        // enough to re-prove membership later without re-reading the file.
        manifest.save(&config.storage.chunk_root.join(sender_id).join("manifest.json"))?;
        tracing::debug!(chunks = store.count(), "chunks mirrored to store");
    }

    tracing::info!(
        path = %path.display(),
        chunks = manifest.len(),
        bytes = manifest.total_size(),
        root = %hex::encode(root),
        "file sent"
    );

    Ok(SendOutcome {
        chunks: manifest.len(),
        bytes: manifest.total_size(),
        root,
    })
}

//! Transfer manifest — the ordered fingerprint list for one file.
//!
//! Born empty when a transfer starts, grows append-only as chunks are
//! produced, and is sealed (serialized to a sidecar) once the commitment
//! has been sent. `fingerprints()[i]` always corresponds to chunk `i`'s
//! content at the time it was fingerprinted.

use std::path::Path;

use courier_core::commitment::{CommitmentIndex, CommitmentRoot};
use courier_core::error::TransferError;
use courier_core::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkManifest {
    chunk_size: u64,
    total_size: u64,
    fingerprints: Vec<Fingerprint>,
}

impl ChunkManifest {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size,
            total_size: 0,
            fingerprints: Vec::new(),
        }
    }

    /// Append the fingerprint for the next chunk in index order.
    pub fn push(&mut self, fingerprint: Fingerprint, chunk_len: u64) {
        self.fingerprints.push(fingerprint);
        self.total_size += chunk_len;
    }

    pub fn len(&self) -> u64 {
        self.fingerprints.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn get(&self, index: u64) -> Option<&Fingerprint> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.fingerprints.get(i))
    }

    pub fn fingerprints(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    /// Build the commitment index over this manifest's fingerprints.
    pub fn commitment(&self) -> Result<CommitmentIndex, TransferError> {
        CommitmentIndex::from_fingerprints(&self.fingerprints)
    }

    /// Root over the current fingerprint list.
    pub fn root(&self) -> Result<CommitmentRoot, TransferError> {
        Ok(self.commitment()?.root())
    }

    /// Persist as a JSON sidecar next to the stored chunks.
    pub fn save(&self, path: &Path) -> Result<(), TransferError> {
        let text = serde_json::to_vec_pretty(self)
            .map_err(|e| TransferError::Io(std::io::Error::other(e)))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, TransferError> {
        let text = std::fs::read(path)?;
        serde_json::from_slice(&text).map_err(|e| TransferError::Io(std::io::Error::other(e)))
    }
}

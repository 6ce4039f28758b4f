//! Ordered, verifying reassembly of a chunk stream into one output file.
//!
//! The reassembler writes to a `.partial` staging path; the final name
//! appears only when the commitment checks out (atomic rename). Whatever
//! happens mid-transfer — disconnect, integrity failure, commitment
//! mismatch — the final path is never visible with unverified content.
//!
//! Chunks are written strictly in increasing index order. An
//! out-of-order arrival is buffered and drained when its turn comes;
//! arrival order never dictates output order.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use courier_core::commitment::{CommitmentIndex, CommitmentRoot};
use courier_core::error::TransferError;
use courier_core::fingerprint::{fingerprint, Fingerprint};

/// Upper bound on buffered out-of-order chunks. TCP delivers in order,
/// so anything near this means the peer is misbehaving.
const MAX_PENDING_CHUNKS: usize = 1024;

/// Summary of a completed reassembly.
#[derive(Debug, Clone)]
pub struct ReassemblyReport {
    pub chunks: u64,
    pub bytes: u64,
    pub root: CommitmentRoot,
}

pub struct Reassembler {
    final_path: PathBuf,
    staging_path: PathBuf,
    /// None once finalized or discarded.
    out: Option<File>,
    next_index: u64,
    pending: BTreeMap<u64, Bytes>,
    index: CommitmentIndex,
    verify: bool,
    bytes_written: u64,
}

impl Reassembler {
    /// Open a staging file for the given final path.
    ///
    /// `verify = false` selects the degraded legacy path: declared
    /// fingerprints are ignored per chunk and tampering surfaces only at
    /// the final commitment check.
    pub fn create(final_path: impl Into<PathBuf>, verify: bool) -> Result<Self, TransferError> {
        let final_path = final_path.into();
        let staging_path = staging_path_for(&final_path);
        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let out = File::create(&staging_path)?;
        Ok(Self {
            final_path,
            staging_path,
            out: Some(out),
            next_index: 0,
            pending: BTreeMap::new(),
            index: CommitmentIndex::new(),
            verify,
            bytes_written: 0,
        })
    }

    /// Number of chunks written to the staging file so far.
    pub fn chunks_written(&self) -> u64 {
        self.next_index
    }

    /// Accept one chunk with its sender-declared fingerprint.
    ///
    /// On an integrity failure nothing is written; the caller decides
    /// whether to [`discard`](Self::discard) (the engines always do).
    pub fn accept_chunk(
        &mut self,
        index: u64,
        declared: Fingerprint,
        bytes: Bytes,
    ) -> Result<(), TransferError> {
        if self.out.is_none() {
            return Err(TransferError::Protocol(
                "chunk received after reassembly ended".into(),
            ));
        }
        if index < self.next_index || self.pending.contains_key(&index) {
            return Err(TransferError::Protocol(format!(
                "duplicate chunk index {index}"
            )));
        }

        let actual = fingerprint(&bytes);
        if self.verify && actual != declared {
            return Err(TransferError::Integrity {
                index,
                expected: declared,
                actual,
            });
        }

        // The receiver's commitment is always over what actually arrived.
        self.index.add(index, actual)?;

        if index == self.next_index {
            self.write_chunk(&bytes)?;
            while let Some(buffered) = self.pending.remove(&self.next_index) {
                self.write_chunk(&buffered)?;
            }
        } else {
            if self.pending.len() >= MAX_PENDING_CHUNKS {
                return Err(TransferError::Protocol(format!(
                    "more than {MAX_PENDING_CHUNKS} chunks buffered out of order"
                )));
            }
            self.pending.insert(index, bytes);
        }
        Ok(())
    }

    fn write_chunk(&mut self, bytes: &Bytes) -> Result<(), TransferError> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| TransferError::Protocol("write after reassembly ended".into()))?;
        out.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        self.next_index += 1;
        Ok(())
    }

    /// Check the claimed root, then atomically publish the output file.
    ///
    /// Failure removes the staging file — a partial or mismatched
    /// reconstruction is never left under the final name.
    pub fn finalize(mut self, claimed_root: &CommitmentRoot) -> Result<ReassemblyReport, TransferError> {
        let out = match self.out.take() {
            Some(out) => out,
            None => {
                return Err(TransferError::Protocol(
                    "finalize after reassembly ended".into(),
                ))
            }
        };

        if !self.pending.is_empty() {
            let gap = self.next_index;
            let buffered = self.pending.len();
            drop(out);
            let _ = fs::remove_file(&self.staging_path);
            return Err(TransferError::Truncated(format!(
                "chunk {gap} never arrived ({buffered} later chunks were buffered)"
            )));
        }

        let computed = self.index.root();
        if computed != *claimed_root {
            drop(out);
            let _ = fs::remove_file(&self.staging_path);
            return Err(TransferError::CommitmentMismatch {
                claimed: *claimed_root,
                computed,
            });
        }

        out.sync_all()?;
        drop(out);
        fs::rename(&self.staging_path, &self.final_path)?;

        Ok(ReassemblyReport {
            chunks: self.next_index,
            bytes: self.bytes_written,
            root: computed,
        })
    }

    /// Drop the staging file. Idempotent; the final path is untouched.
    pub fn discard(&mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(out) = self.out.take() {
            drop(out);
            let _ = fs::remove_file(&self.staging_path);
        }
    }
}

fn staging_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".partial");
    final_path.with_file_name(name)
}

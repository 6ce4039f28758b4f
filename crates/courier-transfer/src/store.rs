//! Content-addressed chunk store.
//!
//! Chunks are stored by content fingerprint in a two-level directory
//! structure, namespaced per peer:
//!   <root>/<peer>/{hash[0..2]}/{full_hash}
//!
//! This is the same layout Git uses for objects. Files are immutable —
//! if the fingerprint exists, the content is correct. Puts are atomic:
//! data is written to a temp file and renamed into place only on
//! success, so a partially written chunk is never visible under its
//! final content address.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use bytes::Bytes;
use courier_core::error::TransferError;
use courier_core::fingerprint::{fingerprint, Fingerprint};
use courier_core::wire::validate_sender_id;
use memmap2::Mmap;

/// Address of a stored chunk — its content fingerprint.
pub type ContentId = Fingerprint;

/// Content-addressed chunk store.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Open a store rooted at the given directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// A store scoped to one peer's namespace below this root.
    ///
    /// The peer id has already passed wire validation, but it is checked
    /// again here — this is the last line between an id and the
    /// filesystem.
    pub fn for_peer(&self, peer_id: &str) -> Result<ChunkStore, TransferError> {
        validate_sender_id(peer_id)?;
        ChunkStore::open(self.root.join(peer_id))
    }

    /// Store a chunk, returning its content address.
    ///
    /// Idempotent: if the fingerprint already exists the write is
    /// skipped (immutability = idempotence).
    pub fn put(&self, data: &[u8]) -> Result<ContentId, TransferError> {
        let id = fingerprint(data);
        let path = self.chunk_path(&id);

        if path.exists() {
            return Ok(id);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        tracing::trace!(id = hex::encode(id), "chunk stored");
        Ok(id)
    }

    /// Retrieve a chunk. Returns None if not present.
    ///
    /// The read is mmap-backed: page faults bring data from disk on
    /// demand and the kernel page cache does the rest.
    pub fn get(&self, id: &ContentId) -> Result<Option<Bytes>, TransferError> {
        let path = self.chunk_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let file = fs::File::open(&path)?;
        // Safety: file is opened read-only and the mapping is never mutated.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Some(Bytes::copy_from_slice(&mmap)))
    }

    pub fn has(&self, id: &ContentId) -> bool {
        self.chunk_path(id).exists()
    }

    fn chunk_path(&self, id: &ContentId) -> PathBuf {
        let hex = hex::encode(id);
        self.root.join(&hex[0..2]).join(&hex)
    }

    /// Count chunks in this namespace (for stats/debugging).
    pub fn count(&self) -> usize {
        let mut total = 0;
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                if let Ok(subdir) = fs::read_dir(entry.path()) {
                    total += subdir.count();
                }
            }
        }
        total
    }

    pub fn clear(&self) {
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let _ = fs::remove_dir_all(entry.path());
            }
        }
    }
}

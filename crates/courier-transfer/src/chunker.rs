//! Fixed-size chunk splitting.
//!
//! The splitter reads its source sequentially, one chunk-sized window at
//! a time — it never needs the whole source in memory and never seeks.
//! Chunk `i` covers bytes `[i * chunk_size, min((i + 1) * chunk_size,
//! total))`; the final chunk is short when the source size is not a
//! multiple of the chunk size. A zero-byte source yields zero chunks.

use std::io::Read;

use bytes::Bytes;
use courier_core::error::TransferError;

/// One contiguous slice of the source, identified by its position index.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: u64,
    pub bytes: Bytes,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Pull-based splitter over any byte source.
pub struct ChunkSplitter<R> {
    source: R,
    chunk_size: usize,
    next_index: u64,
    done: bool,
}

impl<R: Read> ChunkSplitter<R> {
    pub fn new(source: R, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize(0));
        }
        let chunk_size =
            usize::try_from(chunk_size).map_err(|_| TransferError::InvalidChunkSize(chunk_size))?;
        Ok(Self {
            source,
            chunk_size,
            next_index: 0,
            done: false,
        })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size as u64
    }

    /// Read the next chunk. Returns None once the source is exhausted —
    /// an empty chunk is never emitted.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.done {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        // A single read may return less than asked; keep filling until
        // the window is full or the source ends.
        while filled < self.chunk_size {
            let n = self.source.read(&mut buf[filled..])?;
            if n == 0 {
                self.done = true;
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }

        buf.truncate(filled);
        let chunk = Chunk {
            index: self.next_index,
            bytes: Bytes::from(buf),
        };
        self.next_index += 1;
        Ok(Some(chunk))
    }
}

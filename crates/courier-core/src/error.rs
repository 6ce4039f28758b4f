//! Transfer error taxonomy.
//!
//! Every failure a transfer can hit maps onto one of these variants.
//! A variant aborts at most the session that raised it — the server's
//! accept loop and the client's retry loop recover from `Connection`
//! locally, and nothing here ever takes down the whole process.

use crate::fingerprint::Fingerprint;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Chunk size must be a positive integer. Detected before any I/O.
    #[error("invalid chunk size: {0} (must be positive)")]
    InvalidChunkSize(u64),

    /// Chunk index beyond the commitment tree's capacity.
    #[error("chunk index {0} exceeds commitment capacity")]
    IndexOutOfRange(u64),

    /// Filesystem read/write failure. Fatal for the current operation,
    /// never retried automatically.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected token, ordering, or length on the wire. Aborts the
    /// session — this is not a resumable protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Connection closed mid-chunk or before the commitment arrived.
    /// Partial output is discarded or left explicitly incomplete.
    #[error("transfer truncated: {0}")]
    Truncated(String),

    /// A chunk's bytes do not match its declared fingerprint.
    #[error(
        "chunk {index} failed integrity check: expected {}, got {}",
        hex::encode(.expected),
        hex::encode(.actual)
    )]
    Integrity {
        index: u64,
        expected: Fingerprint,
        actual: Fingerprint,
    },

    /// The final root does not reproduce the sender's claimed commitment.
    /// The output artifact is removed rather than exposed as valid.
    #[error(
        "commitment mismatch: sender claimed {}, receiver computed {}",
        hex::encode(.claimed),
        hex::encode(.computed)
    )]
    CommitmentMismatch {
        claimed: [u8; 32],
        computed: [u8; 32],
    },

    /// A chunk label that maps to no index.
    #[error("unknown chunk label: {0:?}")]
    UnknownChunk(String),

    /// Dial or accept failure. Recovered locally: the server keeps
    /// accepting, the client retries per its backoff policy.
    #[error("connection failed: {0}")]
    Connection(String),
}

impl TransferError {
    /// True when the underlying stream died and the client's retry loop
    /// may reasonably dial again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Connection(_) | TransferError::Truncated(_) => true,
            TransferError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

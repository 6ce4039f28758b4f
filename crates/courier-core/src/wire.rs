//! Courier wire protocol — framing for one file transfer conversation.
//!
//! All control lines are newline-terminated UTF-8; chunk payloads are raw
//! bytes preceded by an explicit 8-byte big-endian length. The length
//! field is authoritative — a label never implies payload size.
//!
//! Conversation shape, sender to receiver:
//!
//! ```text
//! "SEND_FILE\n" <senderId> "\n"
//! repeated:  <label> "\n" <length: u64 BE> <length payload bytes>
//! "MERKLE_ROOT\n" <root digest hex> "\n"
//! ```
//!
//! The decoder yields tagged frames (`Chunk` or `Commitment`), so a chunk
//! label can never be confused with the terminator token. There is no
//! recovery path: any violation aborts the session.

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::commitment::CommitmentRoot;
use crate::error::TransferError;
use crate::fingerprint::Fingerprint;

/// Handshake token opening every transfer.
pub const TOKEN_SEND_FILE: &str = "SEND_FILE";

/// Terminator token introducing the root digest line.
pub const TOKEN_MERKLE_ROOT: &str = "MERKLE_ROOT";

/// Hard cap on a single chunk payload. The length field is attacker
/// controlled; anything above this aborts before allocation.
pub const MAX_FRAME_PAYLOAD: u64 = 16 * 1024 * 1024;

/// Hard cap on a control line, including the newline.
pub const MAX_CONTROL_LINE: usize = 256;

/// Maximum sender id length in bytes.
pub const MAX_SENDER_ID: usize = 64;

/// A sender id names the per-peer storage namespace, so it must never be
/// able to escape it.
pub fn validate_sender_id(id: &str) -> Result<(), TransferError> {
    if id.is_empty() || id.len() > MAX_SENDER_ID {
        return Err(TransferError::Protocol(format!(
            "sender id must be 1..={MAX_SENDER_ID} bytes, got {}",
            id.len()
        )));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(TransferError::Protocol(format!(
            "sender id {id:?} contains characters outside [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

// ── Chunk labels ──────────────────────────────────────────────────────────────

/// The control-line identity of one chunk: `chunk<index>:<fingerprint hex>`.
///
/// Opaque on the wire; the receiver parses it back into an index and the
/// sender-declared fingerprint. Structurally distinct from both tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLabel {
    pub index: u64,
    pub fingerprint: Fingerprint,
}

impl ChunkLabel {
    pub fn parse(s: &str) -> Result<Self, TransferError> {
        let unknown = || TransferError::UnknownChunk(s.to_string());
        let rest = s.strip_prefix("chunk").ok_or_else(unknown)?;
        let (index, fp_hex) = rest.split_once(':').ok_or_else(unknown)?;
        let index: u64 = index.parse().map_err(|_| unknown())?;
        let mut fingerprint = [0u8; 32];
        hex::decode_to_slice(fp_hex, &mut fingerprint).map_err(|_| unknown())?;
        Ok(Self { index, fingerprint })
    }
}

impl std::fmt::Display for ChunkLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chunk{}:{}", self.index, hex::encode(self.fingerprint))
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Chunk { label: ChunkLabel, payload: Bytes },
    Commitment { root: CommitmentRoot },
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Encodes the sender side of a conversation onto any async byte sink.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn handshake(&mut self, sender_id: &str) -> Result<(), TransferError> {
        validate_sender_id(sender_id)?;
        self.inner.write_all(TOKEN_SEND_FILE.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.write_all(sender_id.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        Ok(())
    }

    pub async fn chunk(&mut self, label: &ChunkLabel, payload: &[u8]) -> Result<(), TransferError> {
        if payload.len() as u64 > MAX_FRAME_PAYLOAD {
            return Err(TransferError::Protocol(format!(
                "chunk {} payload of {} bytes exceeds frame cap",
                label.index,
                payload.len()
            )));
        }
        self.inner.write_all(label.to_string().as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner
            .write_all(&(payload.len() as u64).to_be_bytes())
            .await?;
        self.inner.write_all(payload).await?;
        Ok(())
    }

    pub async fn commitment(&mut self, root: &CommitmentRoot) -> Result<(), TransferError> {
        self.inner.write_all(TOKEN_MERKLE_ROOT.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.write_all(hex::encode(root).as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), TransferError> {
        self.inner.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Decodes the receiver side of a conversation from any async byte source.
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Read the opening handshake; returns the validated sender id.
    pub async fn handshake(&mut self) -> Result<String, TransferError> {
        let token = read_control_line(&mut self.inner)
            .await?
            .ok_or_else(|| TransferError::Truncated("stream closed before handshake".into()))?;
        if token != TOKEN_SEND_FILE {
            return Err(TransferError::Protocol(format!(
                "expected {TOKEN_SEND_FILE:?} handshake token, got {token:?}"
            )));
        }
        let sender_id = read_control_line(&mut self.inner)
            .await?
            .ok_or_else(|| TransferError::Truncated("stream closed before sender id".into()))?;
        validate_sender_id(&sender_id)?;
        Ok(sender_id)
    }

    /// Read the next frame.
    ///
    /// A clean close before the commitment is still [`TransferError::
    /// Truncated`] — the terminator is the only legitimate end of a
    /// conversation.
    pub async fn frame(&mut self) -> Result<Frame, TransferError> {
        let line = read_control_line(&mut self.inner)
            .await?
            .ok_or_else(|| TransferError::Truncated("stream closed before commitment".into()))?;

        if line == TOKEN_MERKLE_ROOT {
            let digest = read_control_line(&mut self.inner)
                .await?
                .ok_or_else(|| TransferError::Truncated("stream closed before root digest".into()))?;
            let mut root = [0u8; 32];
            hex::decode_to_slice(&digest, &mut root).map_err(|_| {
                TransferError::Protocol(format!("malformed root digest {digest:?}"))
            })?;
            return Ok(Frame::Commitment { root });
        }

        let label = ChunkLabel::parse(&line)?;

        let mut len_buf = [0u8; 8];
        self.inner
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| eof_as_truncated(e, "stream closed inside chunk length"))?;
        let len = u64::from_be_bytes(len_buf);
        if len > MAX_FRAME_PAYLOAD {
            return Err(TransferError::Protocol(format!(
                "chunk {} declares {len} payload bytes, above the frame cap",
                label.index
            )));
        }

        let mut payload = vec![0u8; len as usize];
        self.inner
            .read_exact(&mut payload)
            .await
            .map_err(|e| eof_as_truncated(e, "stream closed mid-chunk"))?;

        Ok(Frame::Chunk {
            label,
            payload: Bytes::from(payload),
        })
    }
}

fn eof_as_truncated(e: std::io::Error, context: &str) -> TransferError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransferError::Truncated(context.to_string())
    } else {
        TransferError::Io(e)
    }
}

/// Read one newline-terminated control line, bounded by
/// [`MAX_CONTROL_LINE`]. Returns None on EOF at a frame boundary.
async fn read_control_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<String>, TransferError> {
    let mut limited = reader.take(MAX_CONTROL_LINE as u64);
    let mut line = String::new();
    let n = limited
        .read_line(&mut line)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => {
                TransferError::Protocol("control line is not valid UTF-8".into())
            }
            _ => TransferError::Io(e),
        })?;
    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') {
        if n == MAX_CONTROL_LINE {
            return Err(TransferError::Protocol(format!(
                "control line exceeds {MAX_CONTROL_LINE} bytes"
            )));
        }
        return Err(TransferError::Truncated("stream closed mid-line".into()));
    }
    line.pop();
    Ok(Some(line))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

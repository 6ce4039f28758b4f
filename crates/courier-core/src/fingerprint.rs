//! Content fingerprinting.
//!
//! A fingerprint is the BLAKE3 digest of one chunk's bytes. Every
//! computation starts from a fresh hasher state, so chunk `i`'s fingerprint
//! never depends on chunk `i-1`'s bytes and independent chunks can be
//! fingerprinted in any order.

/// A 32-byte BLAKE3 content digest.
///
/// Doubles as the Merkle leaf value: the commitment is built over exactly
/// these digests, in chunk-index order.
pub type Fingerprint = [u8; 32];

/// Fingerprint a byte slice.
pub fn fingerprint(data: &[u8]) -> Fingerprint {
    *blake3::hash(data).as_bytes()
}

/// Incremental fingerprint for a chunk that arrives in pieces.
///
/// # Example
/// ```
/// use courier_core::fingerprint::{fingerprint, Hasher};
/// let mut h = Hasher::new();
/// h.update(b"hello ");
/// h.update(b"world");
/// assert_eq!(h.finalize(), fingerprint(b"hello world"));
/// ```
pub struct Hasher(blake3::Hasher);

impl Hasher {
    pub fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> Fingerprint {
        *self.0.finalize().as_bytes()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

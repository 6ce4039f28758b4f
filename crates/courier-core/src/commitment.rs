//! Chunk-set commitment — a fixed-depth sparse Merkle tree keyed by
//! chunk index.
//!
//! Leaves are chunk content fingerprints. Slots that were never inserted
//! hash as a precomputed empty-subtree chain, which makes the structure
//! tolerant of sparse and out-of-order insertion and gives
//! non-membership proofs the same shape as membership proofs: a path of
//! `TREE_DEPTH` siblings from the leaf to the root.
//!
//! Any single fingerprint change changes the root; recomputing the root
//! from the same leaf set is deterministic.

use std::collections::BTreeMap;

use crate::error::TransferError;
use crate::fingerprint::Fingerprint;

/// Height of the tree. Indexes up to 2^24 - 1 are addressable — 16M
/// chunks, which at the default chunk size covers files up to 2 TiB.
pub const TREE_DEPTH: usize = 24;

/// One past the highest addressable leaf index.
pub const MAX_LEAVES: u64 = 1 << TREE_DEPTH;

/// The digest a slot holds when no fingerprint was ever inserted there.
pub const EMPTY_LEAF: [u8; 32] = [0u8; 32];

/// A single digest binding the full ordered fingerprint set.
pub type CommitmentRoot = [u8; 32];

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// The commitment index: insert fingerprints by chunk index, read the
/// root, produce and verify per-index proofs.
#[derive(Debug, Clone)]
pub struct CommitmentIndex {
    leaves: BTreeMap<u64, Fingerprint>,
    /// empty[d] = root of an all-empty subtree of height d.
    empty: [[u8; 32]; TREE_DEPTH + 1],
}

impl CommitmentIndex {
    pub fn new() -> Self {
        let mut empty = [[0u8; 32]; TREE_DEPTH + 1];
        for d in 1..=TREE_DEPTH {
            empty[d] = hash_pair(&empty[d - 1], &empty[d - 1]);
        }
        Self {
            leaves: BTreeMap::new(),
            empty,
        }
    }

    /// Build an index from an ordered fingerprint list, leaf `i` taken
    /// from position `i`.
    pub fn from_fingerprints(fingerprints: &[Fingerprint]) -> Result<Self, TransferError> {
        let mut index = Self::new();
        for (i, fp) in fingerprints.iter().enumerate() {
            index.add(i as u64, *fp)?;
        }
        Ok(index)
    }

    /// Insert or overwrite the leaf at `index`.
    ///
    /// Appending in increasing index order is the expected pattern, but
    /// sparse and out-of-order insertion are equally valid — proofs are
    /// keyed by index, not insertion order.
    pub fn add(&mut self, index: u64, fingerprint: Fingerprint) -> Result<(), TransferError> {
        if index >= MAX_LEAVES {
            return Err(TransferError::IndexOutOfRange(index));
        }
        self.leaves.insert(index, fingerprint);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn contains(&self, index: u64) -> bool {
        self.leaves.contains_key(&index)
    }

    /// Recompute the root over the current leaf set.
    pub fn root(&self) -> CommitmentRoot {
        self.node(TREE_DEPTH, 0)
    }

    /// Produce a proof for `index` against the current root.
    ///
    /// `existence` is true (and `fingerprint` is the inserted value) when
    /// a leaf is present; otherwise the proof shows the slot holds the
    /// empty leaf. The proof goes stale as soon as any leaf changes.
    pub fn prove(&self, index: u64) -> Result<Proof, TransferError> {
        if index >= MAX_LEAVES {
            return Err(TransferError::IndexOutOfRange(index));
        }
        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        for depth in 0..TREE_DEPTH {
            let sibling_base = ((index >> depth) ^ 1) << depth;
            siblings.push(self.node(depth, sibling_base));
        }
        let (existence, fingerprint) = match self.leaves.get(&index) {
            Some(fp) => (true, *fp),
            None => (false, EMPTY_LEAF),
        };
        Ok(Proof {
            index,
            existence,
            fingerprint,
            siblings,
        })
    }

    /// Check that `proof` shows `expected` present at `index` under `root`.
    ///
    /// Usable by a party holding only the proof and the claimed root —
    /// the manifest itself is not consulted.
    pub fn verify(
        proof: &Proof,
        root: &CommitmentRoot,
        index: u64,
        expected: &Fingerprint,
    ) -> bool {
        proof.index == index
            && proof.existence
            && proof.fingerprint == *expected
            && proof.verify(root)
    }

    /// Root of the subtree of height `depth` whose leftmost leaf is `base`.
    /// Subtrees containing no inserted leaves resolve to the precomputed
    /// empty chain without recursing.
    fn node(&self, depth: usize, base: u64) -> [u8; 32] {
        let span = 1u64 << depth;
        if self.leaves.range(base..base + span).next().is_none() {
            return self.empty[depth];
        }
        if depth == 0 {
            return self.leaves[&base];
        }
        let half = span / 2;
        hash_pair(
            &self.node(depth - 1, base),
            &self.node(depth - 1, base + half),
        )
    }
}

impl Default for CommitmentIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Evidence that a leaf is (or is not) part of a committed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub index: u64,
    pub existence: bool,
    /// The inserted fingerprint, or [`EMPTY_LEAF`] for non-membership.
    pub fingerprint: Fingerprint,
    /// Sibling digests from the leaf level upward.
    pub siblings: Vec<[u8; 32]>,
}

impl Proof {
    /// Recompute the root candidate from the proof path and compare.
    pub fn verify(&self, root: &CommitmentRoot) -> bool {
        if self.siblings.len() != TREE_DEPTH {
            return false;
        }
        let mut acc = self.fingerprint;
        for (depth, sibling) in self.siblings.iter().enumerate() {
            acc = if (self.index >> depth) & 1 == 0 {
                hash_pair(&acc, sibling)
            } else {
                hash_pair(sibling, &acc)
            };
        }
        acc == *root
    }
}

//! Blake3 data roots over upload chunks.
//!
//! The client folds chunk hashes into a root while streaming; the node
//! recomputes the root from the chunks it actually stored and refuses to
//! finalize an upload whose roots disagree.

use hex::ToHex;
use rs_merkle::{Hasher, MerkleTree};

pub type Hash = [u8; 32];

/// Blake3 powered hasher compatible with `rs_merkle`.
#[derive(Debug, Clone, Copy)]
pub struct Blake3;

impl Hasher for Blake3 {
    type Hash = Hash;

    fn hash(data: &[u8]) -> Self::Hash {
        *blake3::hash(data).as_bytes()
    }
}

pub fn chunk_hash(chunk: &[u8]) -> Hash {
    Blake3::hash(chunk)
}

/// Merkle root over the chunk hashes of one upload.
#[derive(Clone, Debug, Default)]
pub struct ChunkTree {
    leaves: Vec<Hash>,
}

impl ChunkTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_leaves(leaves: Vec<Hash>) -> Self {
        Self { leaves }
    }

    pub fn from_chunks<C: AsRef<[u8]>>(chunks: &[C]) -> Self {
        Self::from_leaves(chunks.iter().map(|c| chunk_hash(c.as_ref())).collect())
    }

    /// Append the next chunk's hash; leaves must arrive in chunk order.
    pub fn push(&mut self, leaf: Hash) {
        self.leaves.push(leaf);
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Root of the tree; an empty upload commits to the hash of no bytes.
    pub fn root(&self) -> Hash {
        MerkleTree::<Blake3>::from_leaves(&self.leaves)
            .root()
            .unwrap_or_else(|| chunk_hash(&[]))
    }

    pub fn root_hex(&self) -> String {
        self.root().encode_hex::<String>()
    }
}

/// Root over `data` split into `chunk_size` pieces (one empty chunk for no data).
pub fn data_root(data: &[u8], chunk_size: usize) -> Hash {
    if data.is_empty() || chunk_size == 0 {
        return ChunkTree::from_chunks(&[data]).root();
    }
    let chunks: Vec<&[u8]> = data.chunks(chunk_size).collect();
    ChunkTree::from_chunks(&chunks).root()
}

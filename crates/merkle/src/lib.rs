//! # Merkle — hash tree over serialized records
//!
//! Detects silent on-disk corruption of a whole SSTable data file. Each
//! leaf is the 128-bit xxh3 digest of one serialized record; interior nodes
//! hash the concatenation of their children; an odd node at the end of a
//! level is paired with itself. At table-load time the tree is recomputed
//! from the data file and compared against the persisted one — any
//! difference rejects the table outright as altered.
//!
//! Nodes live in level-ordered vectors (`levels[0]` = leaves, last level =
//! root), so building and comparing are index walks with no pointer cycles.
//!
//! ## File format (big-endian)
//!
//! ```text
//! [level_count: u32] then per level: [node_count: u32][node_count * 16 hash bytes]
//! ```

use std::io::{self, Read, Write};
use xxhash_rust::xxh3::xxh3_128;

/// A 128-bit node digest.
pub type Hash = [u8; 16];

/// Hashes one serialized record into a leaf digest.
#[must_use]
pub fn hash_leaf(blob: &[u8]) -> Hash {
    xxh3_128(blob).to_be_bytes()
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut buf = [0u8; 32];
    buf[..16].copy_from_slice(left);
    buf[16..].copy_from_slice(right);
    xxh3_128(&buf).to_be_bytes()
}

/// Incremental tree construction — push one record blob at a time so the
/// SSTable builder never has to hold all records in memory twice.
#[derive(Debug, Default)]
pub struct MerkleBuilder {
    leaves: Vec<Hash>,
}

impl MerkleBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the digest of one serialized record.
    pub fn add(&mut self, blob: &[u8]) {
        self.leaves.push(hash_leaf(blob));
    }

    /// Number of leaves added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Returns `true` if no leaf has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Folds the accumulated leaves into the full tree.
    #[must_use]
    pub fn build(self) -> MerkleTree {
        MerkleTree::from_leaves(self.leaves)
    }
}

/// A complete hash tree, levels stored bottom-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaf digests; the last level holds the root.
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Builds the tree for a list of record blobs in one call.
    #[must_use]
    pub fn build<B: AsRef<[u8]>>(blobs: &[B]) -> Self {
        let mut b = MerkleBuilder::new();
        for blob in blobs {
            b.add(blob.as_ref());
        }
        b.build()
    }

    fn from_leaves(leaves: Vec<Hash>) -> Self {
        if leaves.is_empty() {
            return Self { levels: Vec::new() };
        }
        let mut levels = vec![leaves];
        while levels.last().map(Vec::len).unwrap_or(0) > 1 {
            let prev = levels.last().expect("non-empty by loop condition");
            let mut next = Vec::with_capacity(prev.len().div_ceil(2));
            for pair in prev.chunks(2) {
                let left = &pair[0];
                // An unpaired trailing node is hashed with itself.
                let right = pair.get(1).unwrap_or(left);
                next.push(hash_pair(left, right));
            }
            levels.push(next);
        }
        Self { levels }
    }

    /// The root digest, or `None` for a tree over zero records.
    #[must_use]
    pub fn root(&self) -> Option<Hash> {
        self.levels.last().and_then(|l| l.first()).copied()
    }

    /// Number of leaf digests.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Serializes the full tree to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&(self.levels.len() as u32).to_be_bytes())?;
        for level in &self.levels {
            w.write_all(&(level.len() as u32).to_be_bytes())?;
            for hash in level {
                w.write_all(hash)?;
            }
        }
        Ok(())
    }

    /// Deserializes a tree from `r`, validating the level shape.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf4 = [0u8; 4];
        r.read_exact(&mut buf4)?;
        let level_count = u32::from_be_bytes(buf4) as usize;

        // A tree over n leaves has ~log2(n)+1 levels; 64 covers any n.
        if level_count > 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "implausible merkle level count",
            ));
        }

        let mut levels = Vec::with_capacity(level_count);
        for _ in 0..level_count {
            r.read_exact(&mut buf4)?;
            let node_count = u32::from_be_bytes(buf4) as usize;
            if node_count == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "empty merkle level",
                ));
            }
            let mut level = Vec::with_capacity(node_count);
            for _ in 0..node_count {
                let mut hash = [0u8; 16];
                r.read_exact(&mut hash)?;
                level.push(hash);
            }
            levels.push(level);
        }

        // Each level must halve (rounding up) toward a single root.
        for w in levels.windows(2) {
            if w[1].len() != w[0].len().div_ceil(2) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "inconsistent merkle level sizes",
                ));
            }
        }
        if let Some(last) = levels.last() {
            if last.len() != 1 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "merkle tree does not terminate in a root",
                ));
            }
        }

        Ok(Self { levels })
    }
}

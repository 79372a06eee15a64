//! Authenticated segment storage
//!
//! A file is split into fixed-size segments; each segment becomes a
//! Merkle leaf. Every tree level is persisted keyed by (level, index),
//! so any leaf's inclusion path can be served without re-reading the
//! source file. Proofs travel as `AuthDataBlock`: the segment bytes
//! plus the sibling hashes from leaf to root.

use std::path::Path;

use crate::crypto::{hash_bytes, hash_pair, Hash};
use serde::{Deserialize, Serialize};

use super::{KvStore, StorageError};

/// Default leaf width in bytes
pub const DEFAULT_SEGMENT_SIZE: usize = 1024;

const HASHES_TREE: &str = "segment_hashes";
const SEGMENTS_TREE: &str = "segment_data";

/// A segment plus its Merkle inclusion path, sibling hashes ordered
/// leaf to root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthDataBlock {
    pub data: Vec<u8>,
    pub merkle_path: Vec<Hash>,
}

impl AuthDataBlock {
    /// Recompute the path: hash the segment, then fold each sibling in,
    /// left or right according to the index bit at that level. The
    /// result must equal the tree's root hash.
    pub fn check(&self, index: u64, root_hash: &Hash) -> bool {
        let mut current = hash_bytes(&self.data);
        let mut position = index;

        for sibling in &self.merkle_path {
            current = if position & 1 == 0 {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            };
            position >>= 1;
        }

        current == *root_hash
    }
}

/// Merkle tree over fixed-size segments, persisted level by level
pub struct MerkleTree {
    hashes: KvStore<(u8, u64), Hash>,
    segments: KvStore<u64, Vec<u8>>,
    segment_size: usize,
    leaf_count: u64,
    depth: u8,
    root: Hash,
}

impl MerkleTree {
    /// Build a tree from raw bytes, persisting segments and all levels.
    ///
    /// A trailing partial segment is zero-padded to the segment size.
    pub fn from_data(db: &sled::Db, data: &[u8], segment_size: usize) -> Result<Self, StorageError> {
        let hashes = KvStore::open(db, HASHES_TREE)?;
        let segments = KvStore::open(db, SEGMENTS_TREE)?;

        let mut leaf_hashes = Vec::new();
        let mut leaf_count = 0u64;
        for chunk in data.chunks(segment_size) {
            let mut segment = vec![0u8; segment_size];
            segment[..chunk.len()].copy_from_slice(chunk);
            segments.set(&leaf_count, &segment);
            leaf_hashes.push(hash_bytes(&segment));
            leaf_count += 1;
        }

        let mut tree = Self {
            hashes,
            segments,
            segment_size,
            leaf_count,
            depth: 0,
            root: Hash::zero(),
        };
        tree.rebuild_levels(leaf_hashes)?;
        Ok(tree)
    }

    /// Build a tree from a file of segments
    pub fn from_file<P: AsRef<Path>>(
        db: &sled::Db,
        path: P,
        segment_size: usize,
    ) -> Result<Self, StorageError> {
        let data = std::fs::read(path).map_err(sled::Error::from)?;
        Self::from_data(db, &data, segment_size)
    }

    /// Reopen a tree from an already-populated store holding
    /// `leaf_count` non-empty segments. The root is recomputed from the
    /// stored leaves, so it matches the root of the original build.
    pub fn open(db: &sled::Db, segment_size: usize, leaf_count: u64) -> Result<Self, StorageError> {
        let hashes = KvStore::open(db, HASHES_TREE)?;
        let segments = KvStore::open(db, SEGMENTS_TREE)?;

        let mut tree = Self {
            hashes,
            segments,
            segment_size,
            leaf_count,
            depth: 0,
            root: Hash::zero(),
        };

        let zero_leaf = tree.zero_leaf_hash();
        let padded = tree.padded_leaves();
        let mut leaf_hashes = Vec::with_capacity(padded as usize);
        for index in 0..leaf_count {
            let leaf = match tree.hashes.get(&(0, index)) {
                Some(hash) => hash,
                // Fall back to rehashing the stored segment
                None => match tree.segments.get(&index) {
                    Some(segment) => hash_bytes(&segment),
                    None => zero_leaf,
                },
            };
            leaf_hashes.push(leaf);
        }

        tree.rebuild_levels(leaf_hashes)?;
        Ok(tree)
    }

    /// Number of leaves after padding to a power of two (at least 2)
    fn padded_leaves(&self) -> u64 {
        self.leaf_count.next_power_of_two().max(2)
    }

    fn zero_leaf_hash(&self) -> Hash {
        hash_bytes(&vec![0u8; self.segment_size])
    }

    /// Persist level 0 from the given real-leaf hashes, pad with the
    /// zero-segment hash, then fold pairs upward to the root.
    fn rebuild_levels(&mut self, mut level: Vec<Hash>) -> Result<(), StorageError> {
        let padded = self.padded_leaves();
        let zero_leaf = self.zero_leaf_hash();
        level.resize(padded as usize, zero_leaf);

        self.depth = padded.trailing_zeros() as u8;

        for (index, hash) in level.iter().enumerate() {
            self.hashes.set(&(0, index as u64), hash);
        }

        let mut current = level;
        for height in 1..=self.depth {
            let mut next = Vec::with_capacity(current.len() / 2);
            for pair in current.chunks(2) {
                next.push(hash_pair(&pair[0], &pair[1]));
            }
            for (index, hash) in next.iter().enumerate() {
                self.hashes.set(&(height, index as u64), hash);
            }
            current = next;
        }

        self.root = current[0];
        self.hashes.commit()?;
        self.segments.commit()?;
        Ok(())
    }

    /// Root hash committing to every segment
    pub fn root_hash(&self) -> Hash {
        self.root
    }

    /// Number of non-empty segments
    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    /// Length of every inclusion path
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Load a segment and its inclusion path.
    ///
    /// Indices in the padded range beyond the last real segment resolve
    /// to the zero segment, so their proofs verify too. Returns `None`
    /// past the padded range or when a stored hash cannot be read.
    pub fn by_index(&self, index: u64) -> Option<AuthDataBlock> {
        if index >= self.padded_leaves() {
            return None;
        }

        let data = if index < self.leaf_count {
            self.segments.get(&index)?
        } else {
            vec![0u8; self.segment_size]
        };

        let mut merkle_path = Vec::with_capacity(self.depth as usize);
        let mut position = index;
        for height in 0..self.depth {
            let sibling = self.hashes.get(&(height, position ^ 1))?;
            merkle_path.push(sibling);
            position >>= 1;
        }

        Some(AuthDataBlock { data, merkle_path })
    }

    /// Flush both backing trees
    pub fn commit(&self) -> Result<(), StorageError> {
        self.hashes.commit()?;
        self.segments.commit()
    }

    /// Flush and release; safe to call more than once
    pub fn close(&self) -> Result<(), StorageError> {
        self.hashes.close()?;
        self.segments.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_data(segments: usize, segment_size: usize) -> Vec<u8> {
        // Deterministic pseudo-random bytes, no RNG dependency in tests
        (0..segments * segment_size)
            .map(|i| (i as u64).wrapping_mul(2654435761).to_le_bytes()[0])
            .collect()
    }

    #[test]
    fn test_every_leaf_proves_membership() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();

        let data = random_data(7, 64);
        let tree = MerkleTree::from_data(&db, &data, 64).unwrap();
        let root = tree.root_hash();

        for i in 0..7 {
            let block = tree.by_index(i).unwrap();
            assert!(block.check(i, &root), "leaf {i} failed verification");
            assert_eq!(block.data, data[(i as usize) * 64..(i as usize + 1) * 64]);
        }
    }

    #[test]
    fn test_padding_leaf_has_valid_proof() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();

        // 7 leaves pad to 8; index 7 is synthetic
        let tree = MerkleTree::from_data(&db, &random_data(7, 64), 64).unwrap();

        let block = tree.by_index(7).unwrap();
        assert_eq!(block.data, vec![0u8; 64]);
        assert!(block.check(7, &tree.root_hash()));

        assert!(tree.by_index(8).is_none());
    }

    #[test]
    fn test_path_length_is_log_of_padded_width() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();

        let tree = MerkleTree::from_data(&db, &random_data(7, 64), 64).unwrap();
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.by_index(0).unwrap().merkle_path.len(), 3);

        let dir2 = tempfile::tempdir().unwrap();
        let db2 = sled::open(dir2.path()).unwrap();
        let single = MerkleTree::from_data(&db2, &random_data(1, 64), 64).unwrap();
        assert_eq!(single.depth(), 1);
    }

    #[test]
    fn test_reopen_reproduces_root() {
        let dir = tempfile::tempdir().unwrap();
        let root;
        {
            let db = sled::open(dir.path()).unwrap();
            let tree = MerkleTree::from_data(&db, &random_data(5, 32), 32).unwrap();
            root = tree.root_hash();
            tree.close().unwrap();
        }

        let db = sled::open(dir.path()).unwrap();
        let reopened = MerkleTree::open(&db, 32, 5).unwrap();
        assert_eq!(reopened.root_hash(), root);

        // Proofs still verify after the rebuild
        let block = reopened.by_index(3).unwrap();
        assert!(block.check(3, &root));
    }

    #[test]
    fn test_corrupted_segment_fails_check() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();

        let tree = MerkleTree::from_data(&db, &random_data(4, 32), 32).unwrap();
        let mut block = tree.by_index(2).unwrap();
        block.data[0] ^= 0xFF;

        assert!(!block.check(2, &tree.root_hash()));
    }

    #[test]
    fn test_proof_is_index_bound() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();

        let tree = MerkleTree::from_data(&db, &random_data(4, 32), 32).unwrap();
        let block = tree.by_index(1).unwrap();

        assert!(block.check(1, &tree.root_hash()));
        assert!(!block.check(2, &tree.root_hash()));
    }

    #[test]
    fn test_trailing_partial_segment_is_zero_padded() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();

        let mut data = random_data(2, 32);
        data.extend_from_slice(&[0xAB; 10]); // 10 bytes into a third segment

        let tree = MerkleTree::from_data(&db, &data, 32).unwrap();
        assert_eq!(tree.leaf_count(), 3);

        let block = tree.by_index(2).unwrap();
        assert_eq!(&block.data[0..10], &[0xAB; 10]);
        assert_eq!(&block.data[10..], &[0u8; 22]);
        assert!(block.check(2, &tree.root_hash()));
    }

    #[test]
    fn test_from_file_matches_from_data() {
        let dir = tempfile::tempdir().unwrap();
        let data = random_data(6, 128);

        let file_path = dir.path().join("segments.bin");
        std::fs::write(&file_path, &data).unwrap();

        let db1 = sled::open(dir.path().join("a")).unwrap();
        let from_file = MerkleTree::from_file(&db1, &file_path, 128).unwrap();

        let db2 = sled::open(dir.path().join("b")).unwrap();
        let from_data = MerkleTree::from_data(&db2, &data, 128).unwrap();

        assert_eq!(from_file.root_hash(), from_data.root_hash());
    }
}

//! SHA-256 hashing
//!
//! All hashing in EMBER uses SHA-256. Generation signatures, Merkle
//! nodes and signing digests are all 32-byte outputs of this module.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 32-byte hash output
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Create a zero hash (used for the genesis generation signature)
    pub const fn zero() -> Self {
        Hash([0u8; 32])
    }

    /// Create hash from bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Create hash from hex string
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash(arr))
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    Hash(digest.into())
}

/// Hash two hashes together (for Merkle tree folding)
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left.0);
    hasher.update(right.0);
    Hash(hasher.finalize().into())
}

/// Double hash (hash of hash), used in address checksums
pub fn double_hash(data: &[u8]) -> Hash {
    let first = hash_bytes(data);
    hash_bytes(&first.0)
}

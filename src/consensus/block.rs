//! Block structure and canonical serialization
//!
//! A block commits to its parent, its consensus data, its transactions
//! and its generator. The canonical header layout below is a consensus
//! artifact: it is the exact byte string that is hashed and signed, and
//! the block id is the 64-byte signature itself.
//!
//! ```text
//! version(1) || timestamp(8) || parent_id(64) || consensus_len(4) ||
//! consensus_bytes || tx_count(4) || { tx_len(4) || tx_bytes }* ||
//! generator(32)
//! ```
//!
//! All integers are big-endian.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::constants::{BASE_TARGET_LENGTH, BLOCK_VERSION, GENERATION_SIGNATURE_LENGTH};
use crate::crypto::{
    hash_bytes, put_u32, put_u64, ByteReader, CodecError, Hash, PrivateKey, PublicKey, Signature,
};
use crate::validation::{Transaction, TransactionError};

/// 64-byte block identifier: the signature over the canonical header
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(#[serde(with = "id_serde")] pub [u8; 64]);

mod id_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        if bytes.len() != 64 {
            return Err(serde::de::Error::custom("invalid block id length"));
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }
}

impl BlockId {
    /// The zero id: parent of genesis, and genesis's own id
    pub const fn zero() -> Self {
        BlockId([0u8; 64])
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 64]
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", hex::encode(self.0))
    }
}

/// Consensus fields carried by every block: the difficulty parameter and
/// the generation signature chaining generators together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusData {
    pub base_target: u64,
    pub generation_signature: Hash,
}

impl ConsensusData {
    /// Serialized width of the consensus fields
    pub const LENGTH: usize = BASE_TARGET_LENGTH + GENERATION_SIGNATURE_LENGTH;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LENGTH);
        buf.extend_from_slice(&self.base_target.to_be_bytes());
        buf.extend_from_slice(&self.generation_signature.0);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::LENGTH {
            return Err(CodecError::InvalidEncoding(format!(
                "consensus data must be {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            )));
        }
        let mut reader = ByteReader::new(bytes);
        let base_target = reader.read_u64()?;
        let generation_signature = Hash(reader.read_array::<32>()?);
        Ok(Self {
            base_target,
            generation_signature,
        })
    }
}

/// Block parsing and signing errors
#[derive(Debug, Error)]
pub enum BlockError {
    #[error(transparent)]
    InvalidEncoding(#[from] CodecError),
    #[error("transaction {index}: {source}")]
    Transaction {
        index: usize,
        source: TransactionError,
    },
    #[error("invalid signature")]
    InvalidSignature,
}

/// An immutable block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub version: u8,
    /// Milliseconds since Unix epoch
    pub timestamp: u64,
    pub parent_id: BlockId,
    pub consensus: ConsensusData,
    pub transactions: Vec<Transaction>,
    pub generator: PublicKey,
    pub signature: Signature,
}

impl Block {
    /// Assemble and sign a block with the given generator key
    pub fn forge(
        timestamp: u64,
        parent_id: BlockId,
        consensus: ConsensusData,
        transactions: Vec<Transaction>,
        generator: &PrivateKey,
    ) -> Self {
        let mut block = Self {
            version: BLOCK_VERSION,
            timestamp,
            parent_id,
            consensus,
            transactions,
            generator: generator.public_key(),
            signature: Signature::zero(),
        };
        let digest = hash_bytes(&block.header_bytes());
        block.signature = generator.sign(&digest);
        block
    }

    /// The block id is the signature over the canonical header
    pub fn id(&self) -> BlockId {
        BlockId(self.signature.0)
    }

    /// Genesis is the unsigned root: zero parent and zero signature
    pub fn is_genesis(&self) -> bool {
        self.parent_id.is_zero() && self.signature == Signature::zero()
    }

    /// Canonical header bytes: the signed portion of the block
    pub fn header_bytes(&self) -> Vec<u8> {
        let consensus_bytes = self.consensus.to_bytes();

        let mut buf = Vec::with_capacity(128 + consensus_bytes.len());
        buf.push(self.version);
        put_u64(&mut buf, self.timestamp);
        buf.extend_from_slice(&self.parent_id.0);
        put_u32(&mut buf, consensus_bytes.len() as u32);
        buf.extend_from_slice(&consensus_bytes);
        put_u32(&mut buf, self.transactions.len() as u32);
        for tx in &self.transactions {
            let tx_bytes = tx.to_bytes();
            put_u32(&mut buf, tx_bytes.len() as u32);
            buf.extend_from_slice(&tx_bytes);
        }
        buf.extend_from_slice(&self.generator.0);
        buf
    }

    /// Full serialization: header followed by the signature
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.header_bytes();
        buf.extend_from_slice(&self.signature.0);
        buf
    }

    /// Parse the canonical layout back into a block
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlockError> {
        let mut reader = ByteReader::new(bytes);

        let version = reader.read_u8()?;
        let timestamp = reader.read_u64()?;
        let parent_id = BlockId(reader.read_array::<64>()?);

        let consensus_len = reader.read_u32()? as usize;
        let consensus = ConsensusData::from_bytes(reader.read_bytes(consensus_len)?)?;

        let tx_count = reader.read_u32()? as usize;
        let mut transactions = Vec::with_capacity(tx_count.min(1024));
        for index in 0..tx_count {
            let tx_len = reader.read_u32()? as usize;
            let tx_bytes = reader.read_bytes(tx_len)?;
            let tx = Transaction::from_bytes(tx_bytes)
                .map_err(|source| BlockError::Transaction { index, source })?;
            transactions.push(tx);
        }

        let generator = PublicKey(reader.read_array::<32>()?);
        let signature = Signature(reader.read_array::<64>()?);
        reader.expect_end()?;

        Ok(Self {
            version,
            timestamp,
            parent_id,
            consensus,
            transactions,
            generator,
            signature,
        })
    }

    /// Verify the block signature over the canonical header.
    ///
    /// Genesis is exempt: it is unsigned by construction.
    pub fn verify_signature(&self) -> bool {
        if self.is_genesis() {
            return true;
        }
        let digest = hash_bytes(&self.header_bytes());
        self.generator.verify(&digest, &self.signature)
    }

    /// Sum of transaction fees, paid to the generator
    pub fn total_fees(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.fee()).sum()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}

impl Eq for Block {}

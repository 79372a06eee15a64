//! Genesis block generation
//!
//! Produces the unsigned, reproducible root block every EMBER node
//! agrees on: fixed timestamp, fixed allocations, the genesis base
//! target and a zero generation signature. Its signature slot stays
//! zero, so its block id is the zero id.

use crate::consensus::{Block, BlockId, ConsensusRules, NxtConsensus};
use crate::constants::{BLOCK_VERSION, GENESIS_TIMESTAMP_MS};
use crate::crypto::{PrivateKey, PublicKey, Signature};
use crate::validation::{GenesisTransaction, Transaction};

/// Initial allocations as (account seed, amount). The seeds are
/// published: EMBER boots as a development chain where any node can
/// forge from block two.
pub const GENESIS_ACCOUNT_SEEDS: &[([u8; 32], u64)] = &[
    ([0x11; 32], 4_000_000_000),
    ([0x22; 32], 3_000_000_000),
    ([0x33; 32], 3_000_000_000),
];

/// The keypairs behind the genesis allocations
pub fn genesis_accounts() -> Vec<(PrivateKey, u64)> {
    GENESIS_ACCOUNT_SEEDS
        .iter()
        .map(|(seed, amount)| {
            let key = PrivateKey::from_bytes(seed).expect("genesis seed is a valid scalar");
            (key, *amount)
        })
        .collect()
}

/// Create the genesis block.
///
/// Byte-for-byte reproducible: every node derives the same block and
/// therefore the same (zero) id.
pub fn genesis_block() -> Block {
    let transactions = genesis_accounts()
        .iter()
        .map(|(key, amount)| {
            Transaction::Genesis(GenesisTransaction::new(
                key.public_key().address(),
                *amount,
                GENESIS_TIMESTAMP_MS,
            ))
        })
        .collect();

    Block {
        version: BLOCK_VERSION,
        timestamp: GENESIS_TIMESTAMP_MS,
        parent_id: BlockId::zero(),
        consensus: NxtConsensus.genesis_data(),
        transactions,
        generator: PublicKey([0u8; 32]),
        signature: Signature::zero(),
    }
}

/// Summary of the genesis parameters
#[derive(Debug)]
pub struct GenesisInfo {
    pub id: BlockId,
    pub timestamp: u64,
    pub base_target: u64,
    pub allocation_total: u64,
}

impl GenesisInfo {
    pub fn new() -> Self {
        let genesis = genesis_block();
        Self {
            id: genesis.id(),
            timestamp: genesis.timestamp,
            base_target: genesis.consensus.base_target,
            allocation_total: genesis.transactions.iter().map(|tx| tx.amount()).sum(),
        }
    }
}

impl Default for GenesisInfo {
    fn default() -> Self {
        Self::new()
    }
}

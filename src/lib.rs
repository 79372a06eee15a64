//! EMBER (EMB) Node Core Library
//!
//! A proof-of-stake cryptocurrency node whose chain is selected by
//! cumulative difficulty over a tree of signed blocks. Forging rights
//! follow the Nxt lottery: a generator may produce a block when its
//! hit falls below a stake-weighted target.
//!
//! EMB is the short form used in addresses and protocol identifiers.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod forging;
pub mod node;
pub mod p2p;
pub mod storage;
pub mod validation;
pub mod wallet;

/// Protocol constants - HARD-CODED, NEVER CONFIGURABLE
pub mod constants {
    /// Target average delay between blocks, in seconds
    pub const AVG_DELAY_SECS: u64 = 2;

    /// Width of the base target field in block consensus data (bytes)
    pub const BASE_TARGET_LENGTH: usize = 8;

    /// Width of the generation signature field (bytes)
    pub const GENERATION_SIGNATURE_LENGTH: usize = 32;

    /// Width of a block signature and of a block id (bytes)
    pub const SIGNATURE_LENGTH: usize = 64;

    /// Largest admissible base target (2^63 - 1)
    pub const MAX_BASE_TARGET: u64 = i64::MAX as u64;

    /// Base target of the genesis block
    pub const GENESIS_BASE_TARGET: u64 = 153_722_867;

    /// Genesis timestamp (milliseconds since Unix epoch)
    pub const GENESIS_TIMESTAMP_MS: u64 = 1_753_920_000_000; // 2025-07-31

    /// Block format version
    pub const BLOCK_VERSION: u8 = 1;

    /// A transaction expires this long after its timestamp
    pub const TRANSACTION_DEADLINE_MS: u64 = 24 * 60 * 60 * 1000;

    /// Fee floor: a transaction must pay at least one token per this many bytes
    pub const MAX_BYTES_PER_TOKEN: u64 = 512;

    /// Width of an account address (bytes)
    pub const ADDRESS_LENGTH: usize = 25;

    /// Leading version byte of an account address ('E')
    pub const ADDRESS_VERSION: u8 = 0x45;

    /// Chain name (short form for addresses and logs)
    pub const CHAIN_NAME: &str = "EMB";

    /// Full chain name
    pub const CHAIN_FULL_NAME: &str = "EMBER";
}

//! Nxt-style forging rules
//!
//! Eligibility is a deterministic lottery: a generator's hit (the first
//! eight bytes of its generation signature) must fall below a target
//! that grows with elapsed time and with the generator's stake. The
//! base target retargets every block toward the configured average
//! delay, bounded to halving/doubling per step.

use thiserror::Error;

use crate::constants::{AVG_DELAY_SECS, GENESIS_BASE_TARGET, MAX_BASE_TARGET};
use crate::crypto::{Hash, PrivateKey, PublicKey};
use crate::validation::Transaction;
use sha2::{Digest, Sha256};

use super::{Block, ConsensusData};

/// Reasons a block fails consensus validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("base target mismatch: declared {declared}, expected {expected}")]
    BaseTargetMismatch { declared: u64, expected: u64 },
    #[error("generation signature mismatch")]
    GenerationSignatureMismatch,
    #[error("hit {hit} does not beat target {target}")]
    HitAboveTarget { hit: u64, target: u128 },
}

/// Stake lookup used by target computation.
///
/// The balance sheet lives outside the consensus engine; validation and
/// forging read it through this seam.
pub trait BalanceSource {
    /// The forging stake of a generator, in tokens
    fn effective_balance(&self, generator: &PublicKey) -> u64;
}

/// The capability set a consensus variant provides to the fork store
/// and the controller.
pub trait ConsensusRules {
    /// Consensus data of the chain's root block
    fn genesis_data(&self) -> ConsensusData;

    /// Per-block contribution to cumulative chain score
    fn block_score(&self, block: &Block) -> u128;

    /// The balance-independent part of validity: retarget equality and
    /// generation-signature chaining. The fork store enforces this on
    /// every append; no stake lookup is needed.
    fn validate_data(&self, block: &Block, parent: &Block) -> Result<(), ConsensusError>;

    /// Full consensus check of `block` against its parent: the data
    /// checks plus the stake-weighted hit-below-target rule.
    fn validate(
        &self,
        block: &Block,
        parent: &Block,
        balances: &dyn BalanceSource,
    ) -> Result<(), ConsensusError>;
}

/// The Nxt consensus engine. Stateless: it reads the tree and the
/// balance sheet but never mutates either.
#[derive(Debug, Clone, Copy, Default)]
pub struct NxtConsensus;

impl NxtConsensus {
    pub fn new() -> Self {
        NxtConsensus
    }

    /// Chain the parent's generation signature with a generator key:
    /// SHA-256(parent_generation_signature || generator_public_key)
    pub fn generation_signature(parent: &Hash, generator: &PublicKey) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(parent.0);
        hasher.update(generator.0);
        Hash(hasher.finalize().into())
    }

    /// The generator's lottery draw: the first eight bytes of its
    /// generation signature as a big-endian integer.
    pub fn hit(parent: &ConsensusData, generator: &PublicKey) -> u64 {
        let gs = Self::generation_signature(&parent.generation_signature, generator);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&gs.0[0..8]);
        u64::from_be_bytes(bytes)
    }

    /// Retarget from the parent's base target given the elapsed time.
    ///
    /// The candidate scales with elapsed seconds over the target delay,
    /// bounded to [prev/2, prev*2] per step and to [1, 2^63 - 1]
    /// overall. A clock reading behind the parent clamps the elapsed
    /// time to zero rather than failing.
    pub fn next_base_target(prev: u64, parent_timestamp: u64, timestamp: u64) -> u64 {
        let eta_secs = timestamp.saturating_sub(parent_timestamp) / 1000;
        let candidate = (prev as u128) * (eta_secs as u128) / (AVG_DELAY_SECS as u128);

        let floor = (prev / 2).max(1);
        let ceiling = prev.saturating_mul(2).min(MAX_BASE_TARGET);

        (candidate.min(u64::MAX as u128) as u64).clamp(floor, ceiling)
    }

    /// The threshold a generator's hit must beat at time `timestamp`
    pub fn target(
        parent: &ConsensusData,
        parent_timestamp: u64,
        balance: u64,
        timestamp: u64,
    ) -> u128 {
        let eta_secs = timestamp.saturating_sub(parent_timestamp) / 1000;
        (parent.base_target as u128) * (eta_secs as u128) * (balance as u128)
    }

    /// Whether `generator` may forge on top of `parent` at `timestamp`
    pub fn is_eligible(
        parent: &Block,
        generator: &PublicKey,
        balance: u64,
        timestamp: u64,
    ) -> bool {
        let hit = Self::hit(&parent.consensus, generator);
        let target = Self::target(&parent.consensus, parent.timestamp, balance, timestamp);
        (hit as u128) < target
    }

    /// Attempt to forge the next block on top of `parent`.
    ///
    /// Returns `None` when the account's hit does not beat the target
    /// at `timestamp`.
    pub fn generate_next_block(
        parent: &Block,
        account: &PrivateKey,
        balance: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
    ) -> Option<Block> {
        let generator = account.public_key();
        if !Self::is_eligible(parent, &generator, balance, timestamp) {
            return None;
        }

        let consensus = ConsensusData {
            base_target: Self::next_base_target(
                parent.consensus.base_target,
                parent.timestamp,
                timestamp,
            ),
            generation_signature: Self::generation_signature(
                &parent.consensus.generation_signature,
                &generator,
            ),
        };

        Some(Block::forge(
            timestamp,
            parent.id(),
            consensus,
            transactions,
            account,
        ))
    }
}

impl ConsensusRules for NxtConsensus {
    fn genesis_data(&self) -> ConsensusData {
        ConsensusData {
            base_target: GENESIS_BASE_TARGET,
            generation_signature: Hash::zero(),
        }
    }

    /// score(B) = 2^64 / base_target. The retarget clamps keep the
    /// base target in [1, 2^63 - 1], so the division is total.
    fn block_score(&self, block: &Block) -> u128 {
        (1u128 << 64) / (block.consensus.base_target.max(1) as u128)
    }

    fn validate_data(&self, block: &Block, parent: &Block) -> Result<(), ConsensusError> {
        let expected_bt = Self::next_base_target(
            parent.consensus.base_target,
            parent.timestamp,
            block.timestamp,
        );
        if block.consensus.base_target != expected_bt {
            return Err(ConsensusError::BaseTargetMismatch {
                declared: block.consensus.base_target,
                expected: expected_bt,
            });
        }

        let expected_gs = Self::generation_signature(
            &parent.consensus.generation_signature,
            &block.generator,
        );
        if block.consensus.generation_signature != expected_gs {
            return Err(ConsensusError::GenerationSignatureMismatch);
        }

        Ok(())
    }

    fn validate(
        &self,
        block: &Block,
        parent: &Block,
        balances: &dyn BalanceSource,
    ) -> Result<(), ConsensusError> {
        self.validate_data(block, parent)?;

        let hit = Self::hit(&parent.consensus, &block.generator);
        let target = Self::target(
            &parent.consensus,
            parent.timestamp,
            balances.effective_balance(&block.generator),
            block.timestamp,
        );
        if (hit as u128) >= target {
            return Err(ConsensusError::HitAboveTarget { hit, target });
        }

        Ok(())
    }
}

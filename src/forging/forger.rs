//! Forging worker
//!
//! Runs one forging attempt over a snapshot of the chain tip, the
//! wallet accounts and the transaction pool. Each account draws its
//! hit against the stake-weighted target; among the eligible
//! candidates the block with the highest score wins. The attempt is a
//! pure function of its snapshot, so the controller can run it off the
//! actor loop and take the result back as a message.

use tracing::debug;

use crate::consensus::{Block, ConsensusRules, NxtConsensus};
use crate::crypto::PrivateKey;
use crate::validation::Transaction;

/// Everything one forging attempt needs, captured at schedule time
pub struct ForgeContext {
    /// The block to build on
    pub parent: Block,
    /// Forging accounts with their effective balances
    pub accounts: Vec<(PrivateKey, u64)>,
    /// Transactions to include in a forged block
    pub transactions: Vec<Transaction>,
}

/// Outcome of a forging attempt
#[derive(Debug)]
pub enum ForgeResult {
    /// An eligible account produced a block
    Forged(Block),
    /// No account beat its target this round
    Idle,
}

/// Attempt to forge at `timestamp` across all accounts in the context
pub fn attempt(ctx: &ForgeContext, timestamp: u64) -> ForgeResult {
    let candidates: Vec<Block> = ctx
        .accounts
        .iter()
        .filter_map(|(account, balance)| {
            NxtConsensus::generate_next_block(
                &ctx.parent,
                account,
                *balance,
                timestamp,
                ctx.transactions.clone(),
            )
        })
        .collect();

    debug!(
        accounts = ctx.accounts.len(),
        eligible = candidates.len(),
        "forging attempt"
    );

    match select_best(candidates) {
        Some(block) => ForgeResult::Forged(block),
        None => ForgeResult::Idle,
    }
}

/// Pick the candidate with the highest block score; on equal scores
/// the earlier candidate wins.
pub fn select_best(candidates: Vec<Block>) -> Option<Block> {
    candidates.into_iter().reduce(|best, candidate| {
        if NxtConsensus.block_score(&candidate) > NxtConsensus.block_score(&best) {
            candidate
        } else {
            best
        }
    })
}

//! Unconfirmed transaction pool
//!
//! Holds transactions waiting for inclusion. Entry is gated on
//! structural validity; expired entries are dropped whenever the pool
//! is consulted. Keyed by signature, matching transaction identity.

use std::collections::HashMap;

use tracing::debug;

use crate::validation::{Transaction, TransactionError};

/// Pool of unconfirmed transactions
#[derive(Debug, Default)]
pub struct MemoryPool {
    txs: HashMap<[u8; 64], Transaction>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a transaction. Rejects structural failures and entries
    /// already past their deadline.
    pub fn put(&mut self, tx: Transaction, now_ms: u64) -> Result<(), TransactionError> {
        tx.validate()?;
        if tx.is_expired(now_ms) {
            debug!(deadline = tx.deadline(), now_ms, "refusing expired transaction");
            return Err(TransactionError::Expired {
                deadline: tx.deadline(),
                now: now_ms,
            });
        }
        self.txs.insert(tx.signature().0, tx);
        Ok(())
    }

    /// Includable transactions at `now_ms`, most profitable first.
    /// Expired entries encountered along the way are evicted.
    pub fn eligible(&mut self, now_ms: u64, limit: usize) -> Vec<Transaction> {
        self.purge_expired(now_ms);

        let mut candidates: Vec<Transaction> = self.txs.values().cloned().collect();
        candidates.sort_by(|a, b| {
            b.fee()
                .cmp(&a.fee())
                .then_with(|| a.timestamp().cmp(&b.timestamp()))
        });
        candidates.truncate(limit);
        candidates
    }

    /// Remove transactions that made it into a block
    pub fn remove_committed(&mut self, committed: &[Transaction]) {
        for tx in committed {
            self.txs.remove(&tx.signature().0);
        }
    }

    fn purge_expired(&mut self, now_ms: u64) {
        let before = self.txs.len();
        self.txs.retain(|_, tx| !tx.is_expired(now_ms));
        let dropped = before - self.txs.len();
        if dropped > 0 {
            debug!(dropped, "evicted expired transactions");
        }
    }

    pub fn contains(&self, tx: &Transaction) -> bool {
        self.txs.contains_key(&tx.signature().0)
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

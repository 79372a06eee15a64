//! Balance sheet
//!
//! Account balances keyed by address, mutated as blocks join the best
//! chain. The consensus engine reads stakes from here through the
//! `BalanceSource` seam; forging weight equals the spendable balance.

use std::collections::HashMap;

use crate::consensus::{BalanceSource, Block};
use crate::crypto::{Address, PublicKey};
use crate::validation::Transaction;
use tracing::warn;

/// In-memory balance sheet
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    balances: HashMap<Address, u64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of an address, zero when unknown
    pub fn balance(&self, address: &Address) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Apply a block's transactions and route its fees to the generator
    pub fn apply_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            self.apply_transaction(tx);
        }

        let fees = block.total_fees();
        if fees > 0 {
            self.credit(block.generator.address(), fees);
        }
    }

    fn apply_transaction(&mut self, tx: &Transaction) {
        match tx {
            Transaction::Genesis(genesis) => {
                self.credit(genesis.recipient, genesis.amount);
            }
            Transaction::Payment(payment) => {
                let sender = payment.sender.address();
                let charged = payment.amount.saturating_add(payment.fee);
                let available = self.balance(&sender);
                if available < charged {
                    // A block that got this far was already validated;
                    // an underfunded payment indicates a gap elsewhere.
                    warn!(%sender, available, charged, "payment exceeds balance, clamping");
                }
                self.debit(sender, charged);
                self.credit(payment.recipient, payment.amount);
            }
        }
    }

    /// Whether a payment is covered by the sender's current balance
    pub fn covers(&self, tx: &Transaction) -> bool {
        match tx {
            Transaction::Genesis(_) => true,
            Transaction::Payment(payment) => {
                self.balance(&payment.sender.address())
                    >= payment.amount.saturating_add(payment.fee)
            }
        }
    }

    /// Check-and-apply, used when packing or admitting sequences:
    /// true when the transaction is funded against this sheet, which
    /// is then updated with its effects so later transactions see the
    /// spent balance.
    pub fn admit(&mut self, tx: &Transaction) -> bool {
        if !self.covers(tx) {
            return false;
        }
        self.apply_transaction(tx);
        true
    }

    /// Whether every transaction in the block is funded, applied in
    /// order against a scratch copy of the sheet. Fees earned by the
    /// block's own generator cannot fund its payments.
    pub fn covers_block(&self, block: &Block) -> bool {
        let mut scratch = self.clone();
        block.transactions.iter().all(|tx| scratch.admit(tx))
    }

    /// Rebuild the sheet from a chain, genesis first
    pub fn replay<'a, I: IntoIterator<Item = &'a Block>>(&mut self, chain: I) {
        self.balances.clear();
        for block in chain {
            self.apply_block(block);
        }
    }

    fn credit(&mut self, address: Address, amount: u64) {
        let entry = self.balances.entry(address).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    fn debit(&mut self, address: Address, amount: u64) {
        let entry = self.balances.entry(address).or_insert(0);
        *entry = entry.saturating_sub(amount);
    }

    /// Number of addresses with recorded balances
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

impl BalanceSource for Ledger {
    fn effective_balance(&self, generator: &PublicKey) -> u64 {
        self.balance(&generator.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{BlockId, ConsensusData};
    use crate::crypto::{Hash, PrivateKey};
    use crate::validation::{GenesisTransaction, PaymentTransaction};

    fn keypair(seed: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[seed; 32]).unwrap()
    }

    fn block_with(transactions: Vec<Transaction>, forger: &PrivateKey) -> Block {
        Block::forge(
            1_700_000_000_000,
            BlockId([1; 64]),
            ConsensusData {
                base_target: 1_000,
                generation_signature: Hash::zero(),
            },
            transactions,
            forger,
        )
    }

    #[test]
    fn test_genesis_allocation_credits_recipient() {
        let recipient = keypair(1).public_key().address();
        let forger = keypair(9);

        let mut ledger = Ledger::new();
        ledger.apply_block(&block_with(
            vec![Transaction::Genesis(GenesisTransaction::new(recipient, 5_000, 0))],
            &forger,
        ));

        assert_eq!(ledger.balance(&recipient), 5_000);
    }

    #[test]
    fn test_payment_moves_funds_and_fee_goes_to_generator() {
        let sender = keypair(1);
        let recipient = keypair(2).public_key().address();
        let forger = keypair(9);

        let mut ledger = Ledger::new();
        ledger.apply_block(&block_with(
            vec![Transaction::Genesis(GenesisTransaction::new(
                sender.public_key().address(),
                1_000,
                0,
            ))],
            &forger,
        ));

        let payment = PaymentTransaction::new(&sender, recipient, 300, 5, 1);
        let block = block_with(vec![Transaction::Payment(payment)], &forger);
        ledger.apply_block(&block);

        assert_eq!(ledger.balance(&sender.public_key().address()), 1_000 - 300 - 5);
        assert_eq!(ledger.balance(&recipient), 300);
        // Generator collected the genesis fee and the payment fee
        assert_eq!(
            ledger.effective_balance(&forger.public_key()),
            1 + 5
        );
    }

    #[test]
    fn test_covers() {
        let sender = keypair(1);
        let recipient = keypair(2).public_key().address();

        let mut ledger = Ledger::new();
        let payment =
            Transaction::Payment(PaymentTransaction::new(&sender, recipient, 300, 5, 1));
        assert!(!ledger.covers(&payment));

        ledger.apply_block(&block_with(
            vec![Transaction::Genesis(GenesisTransaction::new(
                sender.public_key().address(),
                1_000,
                0,
            ))],
            &keypair(9),
        ));
        assert!(ledger.covers(&payment));
    }

    #[test]
    fn test_covers_block_accepts_funded_sequence() {
        let sender = keypair(1);
        let recipient = keypair(2).public_key().address();
        let forger = keypair(9);

        let mut ledger = Ledger::new();
        ledger.apply_block(&block_with(
            vec![Transaction::Genesis(GenesisTransaction::new(
                sender.public_key().address(),
                1_000,
                0,
            ))],
            &forger,
        ));

        let block = block_with(
            vec![
                Transaction::Payment(PaymentTransaction::new(&sender, recipient, 300, 5, 1)),
                Transaction::Payment(PaymentTransaction::new(&sender, recipient, 200, 5, 2)),
            ],
            &forger,
        );
        assert!(ledger.covers_block(&block));
        // The scratch check leaves the real sheet untouched
        assert_eq!(ledger.balance(&sender.public_key().address()), 1_000);
    }

    #[test]
    fn test_covers_block_rejects_unfunded_payment() {
        let sender = keypair(1);
        let recipient = keypair(2).public_key().address();

        let ledger = Ledger::new();
        let block = block_with(
            vec![Transaction::Payment(PaymentTransaction::new(
                &sender, recipient, 300, 5, 1,
            ))],
            &keypair(9),
        );
        assert!(!ledger.covers_block(&block));
    }

    #[test]
    fn test_covers_block_rejects_cumulative_overdraft() {
        let sender = keypair(1);
        let recipient = keypair(2).public_key().address();
        let forger = keypair(9);

        let mut ledger = Ledger::new();
        ledger.apply_block(&block_with(
            vec![Transaction::Genesis(GenesisTransaction::new(
                sender.public_key().address(),
                1_000,
                0,
            ))],
            &forger,
        ));

        // Each payment is covered alone but not back to back
        let first = Transaction::Payment(PaymentTransaction::new(&sender, recipient, 600, 5, 1));
        let second = Transaction::Payment(PaymentTransaction::new(&sender, recipient, 600, 5, 2));
        assert!(ledger.covers(&first));
        assert!(ledger.covers(&second));

        let block = block_with(vec![first, second], &forger);
        assert!(!ledger.covers_block(&block));
    }

    #[test]
    fn test_admit_updates_the_sheet() {
        let sender = keypair(1);
        let recipient = keypair(2).public_key().address();

        let mut ledger = Ledger::new();
        ledger.apply_block(&block_with(
            vec![Transaction::Genesis(GenesisTransaction::new(
                sender.public_key().address(),
                1_000,
                0,
            ))],
            &keypair(9),
        ));

        let payment =
            Transaction::Payment(PaymentTransaction::new(&sender, recipient, 600, 5, 1));
        assert!(ledger.admit(&payment));
        assert_eq!(ledger.balance(&sender.public_key().address()), 395);
        // The same spend no longer fits
        assert!(!ledger.admit(&payment));
    }

    #[test]
    fn test_replay_resets_previous_state() {
        let a = keypair(1).public_key().address();
        let forger = keypair(9);

        let block =
            block_with(vec![Transaction::Genesis(GenesisTransaction::new(a, 100, 0))], &forger);

        let mut ledger = Ledger::new();
        ledger.apply_block(&block);
        ledger.apply_block(&block);
        assert_eq!(ledger.balance(&a), 200);

        ledger.replay([&block]);
        assert_eq!(ledger.balance(&a), 100);
    }
}

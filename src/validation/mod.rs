//! Validation module - Transaction types, fee and deadline rules

mod transaction;

pub use transaction::*;

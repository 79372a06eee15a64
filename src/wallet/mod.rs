//! Wallet module - forging keypairs and lock state

mod wallet;

pub use wallet::*;

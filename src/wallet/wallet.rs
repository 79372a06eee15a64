//! Wallet: forging accounts
//!
//! Holds the signing keypairs the node forges with. Key management UX
//! lives outside the core; the controller only needs the accounts and
//! the lock state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{Address, KeyError, PrivateKey, PublicKey};

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet is locked")]
    Locked,
    #[error("invalid key material: {0}")]
    InvalidKey(#[from] KeyError),
}

/// A signing keypair with its derived address
#[derive(Debug, Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    pub public_key: PublicKey,
    pub address: Address,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let private_key = PrivateKey::generate();
        let public_key = private_key.public_key();
        let address = public_key.address();

        Self {
            private_key,
            public_key,
            address,
        }
    }

    /// Import from private key bytes
    pub fn from_private_key_bytes(bytes: &[u8; 32]) -> Result<Self, WalletError> {
        let private_key = PrivateKey::from_bytes(bytes)?;
        let public_key = private_key.public_key();
        let address = public_key.address();

        Ok(Self {
            private_key,
            public_key,
            address,
        })
    }

    /// The signing key
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

/// Seed material persisted for a wallet
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletSeed {
    pub keys: Vec<[u8; 32]>,
}

/// The node's forging accounts
#[derive(Debug, Default)]
pub struct Wallet {
    accounts: Vec<KeyPair>,
    locked: bool,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a wallet from seed material
    pub fn from_seed(seed: &WalletSeed) -> Result<Self, WalletError> {
        let mut wallet = Self::new();
        for bytes in &seed.keys {
            wallet.accounts.push(KeyPair::from_private_key_bytes(bytes)?);
        }
        Ok(wallet)
    }

    /// Add a freshly generated account and return it
    pub fn generate_account(&mut self) -> &KeyPair {
        self.accounts.push(KeyPair::generate());
        self.accounts.last().expect("just pushed")
    }

    /// The forging accounts, unavailable while locked
    pub fn forging_accounts(&self) -> Result<&[KeyPair], WalletError> {
        if self.locked {
            return Err(WalletError::Locked);
        }
        Ok(&self.accounts)
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

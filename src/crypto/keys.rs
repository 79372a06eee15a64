//! Schnorr signing keys and account addresses
//!
//! Generators are identified by 32-byte x-only public keys on secp256k1
//! and sign 32-byte digests, producing 64-byte signatures. Account
//! addresses are 25-byte versioned hashes of a public key.

use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature as K256Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::codec::{base58_decode, base58_encode};
use super::{double_hash, hash_bytes, Hash};
use crate::constants::{ADDRESS_LENGTH, ADDRESS_VERSION};

/// Key and signature errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid address")]
    InvalidAddress,
}

/// 32-byte private key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// 32-byte public key (x-only)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

/// 64-byte Schnorr signature
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "sig_serde")] pub [u8; 64]);

mod sig_serde {
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
            return Err(serde::de::Error::custom("invalid signature length"));
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }
}

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        PrivateKey(signing_key)
    }

    /// Create from 32 bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        SigningKey::from_bytes(bytes)
            .map(PrivateKey)
            .map_err(|_| KeyError::InvalidPrivateKey)
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        let verifying_key = self.0.verifying_key();
        let bytes = verifying_key.to_bytes();
        PublicKey(bytes.into())
    }

    /// Sign a 32-byte digest
    pub fn sign(&self, digest: &Hash) -> Signature {
        let signature: K256Signature = self.0.sign(&digest.0);
        Signature(signature.to_bytes())
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }
}

impl PublicKey {
    /// Create from 32 bytes, validating the point
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(PublicKey(*bytes))
    }

    /// Verify a signature over a 32-byte digest
    pub fn verify(&self, digest: &Hash, signature: &Signature) -> bool {
        let verifying_key = match VerifyingKey::from_bytes(&self.0) {
            Ok(vk) => vk,
            Err(_) => return false,
        };

        let sig = match K256Signature::try_from(signature.0.as_slice()) {
            Ok(s) => s,
            Err(_) => return false,
        };

        verifying_key.verify(&digest.0, &sig).is_ok()
    }

    /// Derive the account address of this key
    pub fn address(&self) -> Address {
        Address::from_public_key(self)
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Signature {
    /// Create from 64 bytes
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Signature(*bytes)
    }

    /// The all-zero signature carried by unsigned genesis artifacts
    pub const fn zero() -> Self {
        Signature([0u8; 64])
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0
    }
}

/// 25-byte account address: version byte, 20-byte key hash, 4-byte checksum
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 25]);

impl Address {
    /// Derive an address from a public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let key_hash = hash_bytes(&public_key.0);
        let mut truncated = [0u8; 20];
        truncated.copy_from_slice(&key_hash.0[0..20]);
        Self::from_key_hash(truncated)
    }

    /// Build an address from a 20-byte key hash, computing the checksum
    pub fn from_key_hash(key_hash: [u8; 20]) -> Self {
        let mut bytes = [0u8; 25];
        bytes[0] = ADDRESS_VERSION;
        bytes[1..21].copy_from_slice(&key_hash);

        let checksum = double_hash(&bytes[0..21]);
        bytes[21..25].copy_from_slice(&checksum.0[0..4]);

        Address(bytes)
    }

    /// Create from raw bytes, verifying the checksum
    pub fn from_bytes(bytes: [u8; 25]) -> Result<Self, KeyError> {
        let checksum = double_hash(&bytes[0..21]);
        if bytes[21..25] != checksum.0[0..4] || bytes[0] != ADDRESS_VERSION {
            return Err(KeyError::InvalidAddress);
        }
        Ok(Address(bytes))
    }

    /// Parse a Base58 address string
    pub fn from_base58(s: &str) -> Result<Self, KeyError> {
        let decoded = base58_decode(s).map_err(|_| KeyError::InvalidAddress)?;
        if decoded.len() != ADDRESS_LENGTH {
            return Err(KeyError::InvalidAddress);
        }
        let mut arr = [0u8; 25];
        arr.copy_from_slice(&decoded);
        Self::from_bytes(arr)
    }

    /// Raw address bytes
    pub fn as_bytes(&self) -> &[u8; 25] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", base58_encode(&self.0))
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

//! Transaction structures and validation
//!
//! Two transaction types exist: genesis allocations and signed payments.
//! Both carry a fee, an amount, a timestamp and a 64-byte signature, and
//! both serialize behind a leading type tag. Transaction equality is by
//! signature.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{MAX_BYTES_PER_TOKEN, TRANSACTION_DEADLINE_MS};
use crate::crypto::{hash_bytes, Address, ByteReader, CodecError, PrivateKey, PublicKey, Signature};

/// Type tag of a genesis allocation
pub const GENESIS_TYPE_ID: u8 = 1;

/// Type tag of a payment
pub const PAYMENT_TYPE_ID: u8 = 2;

/// Transaction errors
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("unknown transaction type {0}")]
    UnknownTransactionType(u8),
    #[error(transparent)]
    InvalidEncoding(#[from] CodecError),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("fee {0} below minimum")]
    FeeTooLow(u64),
    #[error("fee {fee} underpays for {length} serialized bytes")]
    FeeBelowByteFloor { fee: u64, length: u64 },
    #[error("deadline {deadline} already passed at {now}")]
    Expired { deadline: u64, now: u64 },
}

/// A genesis allocation crediting an address at chain birth.
///
/// Genesis transactions are unsigned; their signature slot holds a
/// deterministic digest of the payload so signature-based equality and
/// ids stay unique per allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisTransaction {
    pub recipient: Address,
    pub amount: u64,
    pub fee: u64,
    pub timestamp: u64,
    pub signature: Signature,
}

/// A signed transfer from the sender's account to a recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub sender: PublicKey,
    pub recipient: Address,
    pub amount: u64,
    pub fee: u64,
    pub timestamp: u64,
    pub signature: Signature,
}

/// Tagged transaction union
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Transaction {
    Genesis(GenesisTransaction),
    Payment(PaymentTransaction),
}

impl GenesisTransaction {
    /// Create a genesis allocation with its derived signature
    pub fn new(recipient: Address, amount: u64, timestamp: u64) -> Self {
        let mut tx = Self {
            recipient,
            amount,
            fee: 1,
            timestamp,
            signature: Signature::zero(),
        };
        tx.signature = tx.derive_signature();
        tx
    }

    /// The deterministic pseudo-signature of an unsigned allocation:
    /// SHA-256 of the payload followed by the SHA-256 of that digest.
    fn derive_signature(&self) -> Signature {
        let payload = self.payload_bytes();
        let first = hash_bytes(&payload);
        let second = hash_bytes(&first.0);

        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(&first.0);
        bytes[32..64].copy_from_slice(&second.0);
        Signature(bytes)
    }

    fn payload_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(50);
        buf.push(GENESIS_TYPE_ID);
        buf.extend_from_slice(self.recipient.as_bytes());
        buf.extend_from_slice(&self.amount.to_be_bytes());
        buf.extend_from_slice(&self.fee.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf
    }

    /// Check that the carried signature matches the payload digest
    pub fn verify_signature(&self) -> bool {
        self.signature == self.derive_signature()
    }
}

impl PaymentTransaction {
    /// Build and sign a payment
    pub fn new(
        sender: &PrivateKey,
        recipient: Address,
        amount: u64,
        fee: u64,
        timestamp: u64,
    ) -> Self {
        let mut tx = Self {
            sender: sender.public_key(),
            recipient,
            amount,
            fee,
            timestamp,
            signature: Signature::zero(),
        };
        let digest = hash_bytes(&tx.payload_bytes());
        tx.signature = sender.sign(&digest);
        tx
    }

    fn payload_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(82);
        buf.push(PAYMENT_TYPE_ID);
        buf.extend_from_slice(&self.sender.0);
        buf.extend_from_slice(self.recipient.as_bytes());
        buf.extend_from_slice(&self.amount.to_be_bytes());
        buf.extend_from_slice(&self.fee.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf
    }

    /// Verify the signature against the sender's public key
    pub fn verify_signature(&self) -> bool {
        let digest = hash_bytes(&self.payload_bytes());
        self.sender.verify(&digest, &self.signature)
    }
}

impl Transaction {
    /// Transaction fee
    pub fn fee(&self) -> u64 {
        match self {
            Transaction::Genesis(tx) => tx.fee,
            Transaction::Payment(tx) => tx.fee,
        }
    }

    /// Transferred amount
    pub fn amount(&self) -> u64 {
        match self {
            Transaction::Genesis(tx) => tx.amount,
            Transaction::Payment(tx) => tx.amount,
        }
    }

    /// Creation timestamp (milliseconds)
    pub fn timestamp(&self) -> u64 {
        match self {
            Transaction::Genesis(tx) => tx.timestamp,
            Transaction::Payment(tx) => tx.timestamp,
        }
    }

    /// Receiving address
    pub fn recipient(&self) -> &Address {
        match self {
            Transaction::Genesis(tx) => &tx.recipient,
            Transaction::Payment(tx) => &tx.recipient,
        }
    }

    /// The 64-byte signature; transaction identity
    pub fn signature(&self) -> &Signature {
        match self {
            Transaction::Genesis(tx) => &tx.signature,
            Transaction::Payment(tx) => &tx.signature,
        }
    }

    /// A transaction is no longer includable once its deadline passed
    pub fn deadline(&self) -> u64 {
        self.timestamp().saturating_add(TRANSACTION_DEADLINE_MS)
    }

    /// Expiry check against a wall-clock reading
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.deadline()
    }

    /// Serialize to the canonical tagged byte layout
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Transaction::Genesis(tx) => {
                let mut buf = tx.payload_bytes();
                buf.extend_from_slice(&tx.signature.0);
                buf
            }
            Transaction::Payment(tx) => {
                let mut buf = tx.payload_bytes();
                buf.extend_from_slice(&tx.signature.0);
                buf
            }
        }
    }

    /// Parse the canonical layout, dispatching on the leading type tag
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        let mut reader = ByteReader::new(bytes);
        let tx = Self::read(&mut reader)?;
        reader.expect_end()?;
        Ok(tx)
    }

    /// Read one transaction from a cursor (used by the block codec)
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self, TransactionError> {
        let type_id = reader.read_u8()?;
        match type_id {
            GENESIS_TYPE_ID => {
                let recipient = Address(reader.read_array::<25>()?);
                let amount = reader.read_u64()?;
                let fee = reader.read_u64()?;
                let timestamp = reader.read_u64()?;
                let signature = Signature(reader.read_array::<64>()?);
                Ok(Transaction::Genesis(GenesisTransaction {
                    recipient,
                    amount,
                    fee,
                    timestamp,
                    signature,
                }))
            }
            PAYMENT_TYPE_ID => {
                let sender = PublicKey(reader.read_array::<32>()?);
                let recipient = Address(reader.read_array::<25>()?);
                let amount = reader.read_u64()?;
                let fee = reader.read_u64()?;
                let timestamp = reader.read_u64()?;
                let signature = Signature(reader.read_array::<64>()?);
                Ok(Transaction::Payment(PaymentTransaction {
                    sender,
                    recipient,
                    amount,
                    fee,
                    timestamp,
                    signature,
                }))
            }
            other => Err(TransactionError::UnknownTransactionType(other)),
        }
    }

    /// Serialized length in bytes
    pub fn serialized_length(&self) -> u64 {
        self.to_bytes().len() as u64
    }

    /// Verify the signature appropriate to the transaction type
    pub fn verify_signature(&self) -> bool {
        match self {
            Transaction::Genesis(tx) => tx.verify_signature(),
            Transaction::Payment(tx) => tx.verify_signature(),
        }
    }

    /// Structural validity: signature, minimum fee and the fee-per-byte
    /// floor of one token per `MAX_BYTES_PER_TOKEN` serialized bytes.
    pub fn validate(&self) -> Result<(), TransactionError> {
        if !self.verify_signature() {
            return Err(TransactionError::InvalidSignature);
        }
        let fee = self.fee();
        if fee < 1 {
            return Err(TransactionError::FeeTooLow(fee));
        }
        let length = self.serialized_length();
        if fee.saturating_mul(MAX_BYTES_PER_TOKEN) < length {
            return Err(TransactionError::FeeBelowByteFloor { fee, length });
        }
        Ok(())
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.signature() == other.signature()
    }
}

impl Eq for Transaction {}

impl std::hash::Hash for Transaction {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.signature().0.hash(state);
    }
}

//! Network protocol messages
//!
//! The message types the node core exchanges with the network layer.
//! Payload framing past the envelope below is the transport's concern.

use serde::{Deserialize, Serialize};

use crate::consensus::{Block, BlockId};

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Network magic bytes (identifies the EMBER network)
pub const NETWORK_MAGIC: [u8; 4] = [0x45, 0x4D, 0x42, 0x52]; // "EMBR"

/// Maximum message size (4 MB)
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Messages exchanged between nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Ask peers for their best chain score
    GetMaxChainScore,
    /// A peer's best chain score, `None` when it has no chain yet
    MaxChainScore(Option<u128>),
    /// Request blocks following the given ids (tip first)
    GetSignatures(Vec<BlockId>),
    /// Announce a block at a height
    Block(BlockMessage),
}

/// A block announcement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMessage {
    pub height: u32,
    pub block: Block,
}

impl Message {
    /// Serialize with the network envelope: magic, length, payload
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = bincode::serialize(self).unwrap_or_default();

        let mut bytes = Vec::with_capacity(4 + 4 + payload.len());
        bytes.extend_from_slice(&NETWORK_MAGIC);
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);

        bytes
    }

    /// Deserialize from the network envelope
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < 8 {
            return Err("message too short".to_string());
        }

        if bytes[0..4] != NETWORK_MAGIC {
            return Err("invalid network magic".to_string());
        }

        let length = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err("message too large".to_string());
        }

        if bytes.len() < 8 + length {
            return Err("incomplete message".to_string());
        }

        bincode::deserialize(&bytes[8..8 + length])
            .map_err(|e| format!("deserialization error: {}", e))
    }

    /// Command name for logging
    pub fn command(&self) -> &'static str {
        match self {
            Message::GetMaxChainScore => "getmaxchainscore",
            Message::MaxChainScore(_) => "maxchainscore",
            Message::GetSignatures(_) => "getsignatures",
            Message::Block(_) => "block",
        }
    }
}

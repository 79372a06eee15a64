//! Byte-level codecs
//!
//! Base58 (Bitcoin alphabet) for human-readable identifiers, and the
//! big-endian fixed-width integer helpers used by the canonical block
//! and transaction layouts.

use thiserror::Error;

/// Codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}

/// Encode bytes as Base58 (Bitcoin alphabet)
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decode a Base58 string (Bitcoin alphabet)
pub fn base58_decode(s: &str) -> Result<Vec<u8>, CodecError> {
    bs58::decode(s)
        .into_vec()
        .map_err(|e| CodecError::InvalidEncoding(e.to_string()))
}

/// Append a big-endian u64 to a byte buffer
pub fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Append a big-endian u32 to a byte buffer
pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// A cursor over a byte slice with big-endian fixed-width reads.
///
/// Every read checks remaining length and fails with `InvalidEncoding`
/// instead of panicking on truncated input.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::InvalidEncoding(format!(
                "unexpected end of input: wanted {} bytes, {} left",
                n,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(arr))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self.take(N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(slice);
        Ok(arr)
    }

    /// Fail unless every byte has been consumed
    pub fn expect_end(&self) -> Result<(), CodecError> {
        if self.remaining() != 0 {
            return Err(CodecError::InvalidEncoding(format!(
                "{} trailing bytes after end of structure",
                self.remaining()
            )));
        }
        Ok(())
    }
}

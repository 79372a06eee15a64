//! Cryptography module - SHA-256 hashing, Schnorr keys, byte codecs

mod codec;
mod hash;
mod keys;

pub use codec::*;
pub use hash::*;
pub use keys::*;

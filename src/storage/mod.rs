//! Storage module - keyed persistence, authenticated segments, the
//! block tree and the balance sheet

mod kv;
mod ledger;
mod mempool;
mod segments;
mod tree;

pub use kv::*;
pub use ledger::*;
pub use mempool::*;
pub use segments::*;
pub use tree::*;

//! Consensus module - Block structure and the Nxt forging rules

mod block;
mod nxt;

pub use block::*;
pub use nxt::*;

//! Forging module - block generation attempts over chain snapshots

mod forger;

pub use forger::*;

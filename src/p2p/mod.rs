//! P2P module - protocol messages and the network collaborator contract

mod network;
mod protocol;

pub use network::*;
pub use protocol::*;

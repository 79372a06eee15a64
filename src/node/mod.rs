//! Node module - genesis, the wall clock and the sync/forge controller

mod controller;
mod genesis;
mod time;

pub use controller::*;
pub use genesis::*;
pub use time::*;

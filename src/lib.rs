//! Session and connection engine for ZooKeeper-style coordination ensembles.
//!
//! The engine owns the connection to one ensemble member at a time, keeps the
//! session alive with heartbeats, pipelines requests and matches their
//! replies in order, tracks one-shot watches and recovers transparently when
//! a member fails. Callbacks run on a dedicated dispatcher thread so caller
//! code never stalls the I/O path.
//!
//! Start with [`Client::builder`].

mod client;
mod codec;
mod config;
mod core;
mod errors;
pub mod metrics;
mod network;
pub mod proto;
mod utils;

pub use client::*;
pub use codec::*;
pub use config::*;
pub use errors::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;

//! Embedded node module
//!
//! An in-memory [`FullNode`](crate::rpc::FullNode) for deployments that run
//! the chain inside the bridge process, plus the transaction codec and
//! unspent set it is built on.

mod memory;
mod transaction;
mod utxo;

pub use memory::*;
pub use transaction::*;
pub use utxo::*;

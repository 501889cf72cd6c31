//! Status API module
//!
//! JSON-RPC 2.0 over HTTP for querying the withdrawal ledger.

mod methods;
mod server;

pub use methods::*;
pub use server::*;

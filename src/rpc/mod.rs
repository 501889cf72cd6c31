//! Chain access module
//!
//! One call surface over a coin daemon's JSON-RPC or an embedded full node.

mod client;
mod node;
mod router;
mod types;

pub use client::*;
pub use node::*;
pub use router::*;
pub use types::*;

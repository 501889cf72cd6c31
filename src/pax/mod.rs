//! PAX withdrawal module
//!
//! Packed asset metadata, opret parsing, pricing, the withdrawal ledger and
//! the chain scanner that fills it.

mod codec;
mod ledger;
mod oracle;
mod scanner;
mod script;

pub use codec::*;
pub use ledger::*;
pub use oracle::*;
pub use scanner::*;
pub use script::*;

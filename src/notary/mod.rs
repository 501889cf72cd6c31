//! Notary helpers
//!
//! Funding-output selection and recognition of the notary's own inputs.

mod funding;
mod inputs;

pub use funding::*;
pub use inputs::*;

//! Cryptography module - hashes, Base58Check addresses, secp256k1 keys

mod address;
mod hash;
mod keys;

pub use address::*;
pub use hash::*;
pub use keys::*;

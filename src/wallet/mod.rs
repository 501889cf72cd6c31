//! Wallet module - in-process key store for the embedded signer

mod wallet;

pub use wallet::*;

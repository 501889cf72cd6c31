//! In-process backends
//!
//! A host that runs the full node inside the same process implements
//! [`FullNode`] (and [`KeyStore`] for its wallet) and attaches it to a
//! [`Router`](super::Router). Results come back already structured.

use super::types::{BlockInfo, InputDescriptor, SignResult, TxInfo, UnspentOutput};
use crate::crypto::{Hash, PrivateKey};

/// Embedded full-node operations used by the bridge
pub trait FullNode: Send + Sync {
    /// Hash of the current best block
    fn best_block_hash(&self) -> Option<Hash>;

    /// Height of the best block
    fn block_count(&self) -> Option<u64>;

    /// Hash of the main-chain block at `height`
    fn block_hash(&self, height: u64) -> Option<Hash>;

    /// Block by hash
    fn block(&self, hash: &Hash) -> Option<BlockInfo>;

    /// Decoded transaction by id
    fn raw_transaction(&self, txid: &Hash) -> Option<TxInfo>;

    /// Decode a serialised transaction
    fn decode_raw_transaction(&self, hex: &str) -> Option<TxInfo>;

    /// Unspent outputs held by the node's wallet
    fn list_unspent(&self, address: &str) -> Vec<UnspentOutput>;

    /// Sign `hex` with one WIF per input (empty string = no key)
    fn sign_raw_transaction(
        &self,
        hex: &str,
        inputs: &[InputDescriptor],
        privkeys: &[String],
    ) -> Option<SignResult>;

    /// Submit a signed transaction, returning its id
    fn send_raw_transaction(&self, hex: &str) -> Option<Hash>;

    /// Notary public keys (hex) active at `height`
    fn notaries(&self, _height: u64) -> Option<Vec<String>> {
        None
    }

    /// Price of `volume` units of `base` in `rel` units at `height`
    fn pax_price(&self, _height: u32, _base: &str, _rel: &str, _volume: u64) -> Option<u64> {
        None
    }
}

/// Local private-key lookup
pub trait KeyStore: Send + Sync {
    /// Private key for `address`, if this process holds it
    fn private_key(&self, address: &str) -> Option<PrivateKey>;
}

//! Unspent output set
//!
//! In-memory index of spendable outputs, keyed by outpoint and owned by the
//! address their script pays.

use std::collections::HashMap;

use super::transaction::RawTransaction;
use crate::crypto::{script_address, AddressParams, Hash};
use crate::rpc::UnspentOutput;

/// Key for unspent lookup: (txid, output_index)
pub type OutPoint = (Hash, u32);

/// Unspent transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unspent {
    /// Amount in smallest units
    pub amount: u64,
    pub address: String,
    pub script: Vec<u8>,
    /// Height of the block that created it
    pub height: u32,
}

/// Set of all unspent transaction outputs
#[derive(Debug, Default)]
pub struct UnspentSet {
    params: AddressParams,
    utxos: HashMap<OutPoint, Unspent>,
}

impl UnspentSet {
    pub fn new(params: AddressParams) -> Self {
        Self {
            params,
            utxos: HashMap::new(),
        }
    }

    pub fn contains(&self, txid: &Hash, vout: u32) -> bool {
        self.utxos.contains_key(&(*txid, vout))
    }

    pub fn get(&self, txid: &Hash, vout: u32) -> Option<&Unspent> {
        self.utxos.get(&(*txid, vout))
    }

    pub fn add(&mut self, txid: Hash, vout: u32, utxo: Unspent) {
        self.utxos.insert((txid, vout), utxo);
    }

    /// Remove a spent output
    pub fn remove(&mut self, txid: &Hash, vout: u32) -> Option<Unspent> {
        self.utxos.remove(&(*txid, vout))
    }

    /// Spend a transaction's inputs and add its addressable outputs.
    ///
    /// Outputs whose script has no address (null data) are not spendable
    /// and are left out.
    pub fn apply_transaction(&mut self, tx: &RawTransaction, height: u32) {
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                self.remove(&input.prev_txid, input.vout);
            }
        }

        let txid = tx.txid();
        for (vout, output) in tx.outputs.iter().enumerate() {
            if let Ok(address) = script_address(&output.script, &self.params) {
                self.add(
                    txid,
                    vout as u32,
                    Unspent {
                        amount: output.value,
                        address,
                        script: output.script.clone(),
                        height,
                    },
                );
            }
        }
    }

    /// `listunspent` entries for `address`
    pub fn by_address(&self, address: &str) -> Vec<UnspentOutput> {
        let mut unspents: Vec<UnspentOutput> = self
            .utxos
            .iter()
            .filter(|(_, utxo)| utxo.address == address)
            .map(|((txid, vout), utxo)| UnspentOutput {
                txid: *txid,
                vout: *vout,
                address: utxo.address.clone(),
                script_pub_key: hex::encode(&utxo.script),
                amount: utxo.amount,
            })
            .collect();
        unspents.sort_by_key(|u| (u.txid, u.vout));
        unspents
    }

    /// Total balance of `address`
    pub fn balance(&self, address: &str) -> u64 {
        self.utxos
            .values()
            .filter(|utxo| utxo.address == address)
            .map(|utxo| utxo.amount)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}

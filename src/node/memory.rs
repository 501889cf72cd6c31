//! In-memory full node
//!
//! A [`FullNode`] backed by height-indexed blocks, a transaction index, an
//! unspent set, a mempool, a price table and a notary list. Blocks are
//! appended by the host; nothing here validates consensus rules beyond
//! input existence and signatures.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::transaction::{RawTransaction, SIGHASH_ALL};
use super::utxo::{OutPoint, UnspentSet};
use crate::constants::COIN;
use crate::crypto::{hash160, sha256d, wif_decode, AddressParams, Hash, PrivateKey, PublicKey};
use crate::pax::push_length;
use crate::rpc::{BlockInfo, FullNode, InputDescriptor, SignResult, TxInfo, UnspentOutput};

const OP_CHECKSIG: u8 = 0xac;

#[derive(Debug)]
struct NodeState {
    blocks: Vec<BlockInfo>,
    block_index: HashMap<Hash, usize>,
    transactions: HashMap<Hash, RawTransaction>,
    unspents: UnspentSet,
    mempool: Vec<RawTransaction>,
    mempool_spends: HashSet<OutPoint>,
    /// (base, rel) -> height -> price of one coin of base in rel units
    prices: HashMap<(String, String), BTreeMap<u32, u64>>,
    notaries: Vec<String>,
}

/// Embedded node kept entirely in memory
#[derive(Debug)]
pub struct MemoryNode {
    params: AddressParams,
    state: RwLock<NodeState>,
}

/// Spend script forms the signer understands
#[derive(Clone, Copy)]
enum SpendScript<'a> {
    PayToPubkey(&'a [u8]),
    PayToPubkeyHash(&'a [u8]),
}

impl<'a> SpendScript<'a> {
    fn parse(script: &'a [u8]) -> Option<Self> {
        match script {
            [33, key @ .., OP_CHECKSIG] if key.len() == 33 => Some(Self::PayToPubkey(key)),
            [0x76, 0xa9, 20, hash @ .., 0x88, OP_CHECKSIG] if hash.len() == 20 => {
                Some(Self::PayToPubkeyHash(hash))
            }
            _ => None,
        }
    }
}

impl MemoryNode {
    /// Node holding only a genesis block
    pub fn new(params: AddressParams) -> Self {
        let genesis = BlockInfo {
            hash: sha256d(b"pax-bridge memory node genesis"),
            height: 0,
            time: 0,
            tx: Vec::new(),
        };
        let mut block_index = HashMap::new();
        block_index.insert(genesis.hash, 0);
        Self {
            params,
            state: RwLock::new(NodeState {
                blocks: vec![genesis],
                block_index,
                transactions: HashMap::new(),
                unspents: UnspentSet::new(params),
                mempool: Vec::new(),
                mempool_spends: HashSet::new(),
                prices: HashMap::new(),
                notaries: Vec::new(),
            }),
        }
    }

    pub fn params(&self) -> &AddressParams {
        &self.params
    }

    /// Append a block with `txs`, returning its hash
    pub fn add_block(&self, txs: Vec<RawTransaction>, time: u64) -> Hash {
        let mut state = self.state.write();
        let height = state.blocks.len() as u64;
        let prev = state.blocks[state.blocks.len() - 1].hash;

        let mut header = Vec::with_capacity(48 + txs.len() * 32);
        header.extend_from_slice(&prev.0);
        header.extend_from_slice(&height.to_le_bytes());
        header.extend_from_slice(&time.to_le_bytes());

        let mut txids = Vec::with_capacity(txs.len());
        for tx in txs {
            let txid = tx.txid();
            header.extend_from_slice(&txid.0);
            state.unspents.apply_transaction(&tx, height as u32);
            for input in &tx.inputs {
                state.mempool_spends.remove(&(input.prev_txid, input.vout));
            }
            state.mempool.retain(|pending| pending.txid() != txid);
            state.transactions.insert(txid, tx);
            txids.push(txid);
        }

        let hash = sha256d(&header);
        state.block_index.insert(hash, height as usize);
        state.blocks.push(BlockInfo {
            hash,
            height,
            time,
            tx: txids,
        });
        debug!(height, %hash, "block added");
        hash
    }

    /// Confirm every mempool transaction in a new block
    pub fn mine_mempool(&self, time: u64) -> Hash {
        let pending = std::mem::take(&mut self.state.write().mempool);
        self.add_block(pending, time)
    }

    pub fn mempool_len(&self) -> usize {
        self.state.read().mempool.len()
    }

    /// Set the price of one coin of `base` in `rel` units from `height` on
    pub fn set_price(&self, base: &str, rel: &str, height: u32, price: u64) {
        self.state
            .write()
            .prices
            .entry((base.to_ascii_uppercase(), rel.to_ascii_uppercase()))
            .or_default()
            .insert(height, price);
    }

    /// Replace the notary list (hex public keys)
    pub fn set_notaries(&self, notaries: Vec<String>) {
        self.state.write().notaries = notaries;
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.state.read().unspents.balance(address)
    }

    /// Script being spent by input `index` and the position of its key.
    ///
    /// Descriptors take precedence; without one the node's own unspent set
    /// is consulted and keys are matched by input position.
    fn spend_script(
        state: &NodeState,
        index: usize,
        (txid, vout): OutPoint,
        inputs: &[InputDescriptor],
    ) -> Option<(usize, Vec<u8>)> {
        if let Some((j, desc)) = inputs
            .iter()
            .enumerate()
            .find(|(_, d)| d.txid == txid && d.vout == vout)
        {
            return hex::decode(&desc.script_pub_key).ok().map(|script| (j, script));
        }
        state
            .unspents
            .get(&txid, vout)
            .map(|utxo| (index, utxo.script.clone()))
    }

    fn sign_input(tx: &RawTransaction, index: usize, script: &[u8], wif: &str) -> Option<Vec<u8>> {
        let (_, bytes) = wif_decode(wif).ok()?;
        let key = PrivateKey::from_bytes(&bytes).ok()?;
        let pubkey = key.public_key();
        let spend = SpendScript::parse(script)?;
        match spend {
            SpendScript::PayToPubkey(expected) if expected == &pubkey.0[..] => {}
            SpendScript::PayToPubkeyHash(expected) if expected == &hash160(&pubkey.0)[..] => {}
            _ => return None,
        }

        let digest = tx.signature_hash(index, script);
        let mut sig = key.sign_digest(&digest).ok()?;
        sig.push(SIGHASH_ALL);

        let mut script_sig = vec![sig.len() as u8];
        script_sig.extend_from_slice(&sig);
        if let SpendScript::PayToPubkeyHash(_) = spend {
            script_sig.push(33);
            script_sig.extend_from_slice(&pubkey.0);
        }
        Some(script_sig)
    }

    fn verify_input(tx: &RawTransaction, index: usize, script: &[u8]) -> bool {
        let pushes = match parse_pushes(&tx.inputs[index].script_sig) {
            Some(pushes) => pushes,
            None => return false,
        };
        let (sig, pubkey) = match (SpendScript::parse(script), pushes.as_slice()) {
            (Some(SpendScript::PayToPubkey(key)), [sig]) => (*sig, key),
            (Some(SpendScript::PayToPubkeyHash(hash)), [sig, key])
                if hash160(key)[..] == hash[..] =>
            {
                (*sig, *key)
            }
            _ => return false,
        };
        let Some((&hashtype, der)) = sig.split_last() else {
            return false;
        };
        let Ok(pubkey) = <[u8; 33]>::try_from(pubkey) else {
            return false;
        };
        hashtype == SIGHASH_ALL
            && PublicKey(pubkey).verify_digest(&tx.signature_hash(index, script), der)
    }
}

fn parse_pushes(script: &[u8]) -> Option<Vec<&[u8]>> {
    let mut pushes = Vec::new();
    let mut rest = script;
    while !rest.is_empty() {
        let (len, header) = push_length(rest).ok()?;
        let data = rest.get(header..header + len)?;
        pushes.push(data);
        rest = &rest[header + len..];
    }
    Some(pushes)
}

impl FullNode for MemoryNode {
    fn best_block_hash(&self) -> Option<Hash> {
        self.state.read().blocks.last().map(|b| b.hash)
    }

    fn block_count(&self) -> Option<u64> {
        Some(self.state.read().blocks.len() as u64 - 1)
    }

    fn block_hash(&self, height: u64) -> Option<Hash> {
        let index = usize::try_from(height).ok()?;
        self.state.read().blocks.get(index).map(|b| b.hash)
    }

    fn block(&self, hash: &Hash) -> Option<BlockInfo> {
        let state = self.state.read();
        let index = *state.block_index.get(hash)?;
        state.blocks.get(index).cloned()
    }

    fn raw_transaction(&self, txid: &Hash) -> Option<TxInfo> {
        let state = self.state.read();
        state
            .transactions
            .get(txid)
            .or_else(|| state.mempool.iter().find(|tx| tx.txid() == *txid))
            .map(|tx| tx.to_info(&self.params))
    }

    fn decode_raw_transaction(&self, hex: &str) -> Option<TxInfo> {
        RawTransaction::from_hex(hex)
            .ok()
            .map(|tx| tx.to_info(&self.params))
    }

    fn list_unspent(&self, address: &str) -> Vec<UnspentOutput> {
        self.state.read().unspents.by_address(address)
    }

    fn sign_raw_transaction(
        &self,
        hex: &str,
        inputs: &[InputDescriptor],
        privkeys: &[String],
    ) -> Option<SignResult> {
        let mut tx = RawTransaction::from_hex(hex).ok()?;
        let state = self.state.read();

        for index in 0..tx.inputs.len() {
            let outpoint = (tx.inputs[index].prev_txid, tx.inputs[index].vout);
            let Some((j, script)) = Self::spend_script(&state, index, outpoint, inputs) else {
                continue;
            };
            let wif = privkeys.get(j).map(String::as_str).unwrap_or_default();
            if wif.is_empty() {
                continue;
            }
            match Self::sign_input(&tx, index, &script, wif) {
                Some(script_sig) => tx.inputs[index].script_sig = script_sig,
                None => debug!(index, "input not signable with supplied key"),
            }
        }

        let complete = tx.inputs.iter().all(|input| !input.script_sig.is_empty());
        Some(SignResult {
            hex: tx.to_hex(),
            complete,
        })
    }

    fn send_raw_transaction(&self, hex: &str) -> Option<Hash> {
        let tx = RawTransaction::from_hex(hex).ok()?;
        let txid = tx.txid();
        let mut state = self.state.write();

        for (index, input) in tx.inputs.iter().enumerate() {
            let outpoint = (input.prev_txid, input.vout);
            let Some(utxo) = state.unspents.get(&input.prev_txid, input.vout) else {
                warn!(%txid, index, "input not unspent");
                return None;
            };
            if state.mempool_spends.contains(&outpoint) {
                warn!(%txid, index, "input already spent in mempool");
                return None;
            }
            if !Self::verify_input(&tx, index, &utxo.script) {
                warn!(%txid, index, "bad signature");
                return None;
            }
        }

        for input in &tx.inputs {
            state.mempool_spends.insert((input.prev_txid, input.vout));
        }
        state.mempool.push(tx);
        Some(txid)
    }

    fn notaries(&self, _height: u64) -> Option<Vec<String>> {
        let state = self.state.read();
        (!state.notaries.is_empty()).then(|| state.notaries.clone())
    }

    fn pax_price(&self, height: u32, base: &str, rel: &str, volume: u64) -> Option<u64> {
        let state = self.state.read();
        let table = state
            .prices
            .get(&(base.to_ascii_uppercase(), rel.to_ascii_uppercase()))?;
        let (_, price) = table.range(..=height).next_back()?;
        let value = volume as u128 * *price as u128 / COIN as u128;
        u64::try_from(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{TxInput, TxOutput};
    use crate::wallet::Wallet;
    use crate::rpc::KeyStore;

    fn p2pkh_script(pubkey: &PublicKey) -> Vec<u8> {
        [&[0x76, 0xa9, 20][..], &hash160(&pubkey.0), &[0x88, OP_CHECKSIG]].concat()
    }

    fn p2pk_script(pubkey: &PublicKey) -> Vec<u8> {
        [&[33u8][..], &pubkey.0, &[OP_CHECKSIG]].concat()
    }

    fn spend(prev: Hash, vout: u32, to: Vec<u8>, value: u64) -> RawTransaction {
        RawTransaction::new(
            vec![TxInput {
                prev_txid: prev,
                vout,
                script_sig: vec![],
                sequence: u32::MAX,
            }],
            vec![TxOutput { value, script: to }],
        )
    }

    #[test]
    fn test_genesis_only() {
        let node = MemoryNode::new(AddressParams::default());
        assert_eq!(node.block_count(), Some(0));
        let hash = node.best_block_hash().unwrap();
        assert_eq!(node.block_hash(0), Some(hash));
        assert_eq!(node.block(&hash).unwrap().height, 0);
        assert!(node.block_hash(1).is_none());
    }

    #[test]
    fn test_blocks_and_transactions() {
        let node = MemoryNode::new(AddressParams::default());
        let coinbase = RawTransaction::coinbase(1, vec![TxOutput { value: 7, script: vec![0x51] }]);
        let hash = node.add_block(vec![coinbase.clone()], 1_700_000_000);

        assert_eq!(node.block_count(), Some(1));
        let block = node.block(&hash).unwrap();
        assert_eq!(block.tx, vec![coinbase.txid()]);
        assert_eq!(node.raw_transaction(&coinbase.txid()).unwrap().vout[0].value, 7);
        assert_eq!(
            node.decode_raw_transaction(&coinbase.to_hex()).unwrap().txid,
            coinbase.txid()
        );
        assert!(node.decode_raw_transaction("00").is_none());
    }

    #[test]
    fn test_sign_and_send_p2pkh_and_p2pk() {
        let params = AddressParams::default();
        let node = MemoryNode::new(params);
        let mut wallet = Wallet::new(params);
        let kp = wallet.generate_key().clone();

        let coinbase = RawTransaction::coinbase(
            1,
            vec![
                TxOutput { value: 10_000, script: p2pkh_script(&kp.public_key) },
                TxOutput { value: 20_000, script: p2pk_script(&kp.public_key) },
            ],
        );
        node.add_block(vec![coinbase.clone()], 1);

        let mut tx = spend(coinbase.txid(), 0, vec![0x51], 9_000);
        tx.inputs.push(TxInput {
            prev_txid: coinbase.txid(),
            vout: 1,
            script_sig: vec![],
            sequence: u32::MAX,
        });

        let descriptors: Vec<InputDescriptor> = (0..2)
            .map(|vout| InputDescriptor {
                txid: coinbase.txid(),
                vout,
                script_pub_key: hex::encode(&coinbase.outputs[vout as usize].script),
            })
            .collect();
        let wif = wallet
            .private_key(&kp.address)
            .unwrap()
            .to_wif(params.wiftype);

        // no keys: untouched, incomplete
        let unsigned = node
            .sign_raw_transaction(&tx.to_hex(), &descriptors, &[String::new(), String::new()])
            .unwrap();
        assert!(!unsigned.complete);
        assert!(node.send_raw_transaction(&unsigned.hex).is_none());

        // one key: partially signed
        let partial = node
            .sign_raw_transaction(&tx.to_hex(), &descriptors, &[wif.clone(), String::new()])
            .unwrap();
        assert!(!partial.complete);

        let signed = node
            .sign_raw_transaction(&tx.to_hex(), &descriptors, &[wif.clone(), wif])
            .unwrap();
        assert!(signed.complete);

        let txid = node.send_raw_transaction(&signed.hex).unwrap();
        assert_eq!(node.mempool_len(), 1);
        // double spend in mempool
        assert!(node.send_raw_transaction(&signed.hex).is_none());

        node.mine_mempool(2);
        assert_eq!(node.mempool_len(), 0);
        assert!(node.raw_transaction(&txid).is_some());
        assert_eq!(node.balance(&kp.address), 0);
    }

    #[test]
    fn test_wrong_key_leaves_input_unsigned() {
        let params = AddressParams::default();
        let node = MemoryNode::new(params);
        let owner = PrivateKey::generate();
        let stranger = PrivateKey::generate();
        let coinbase = RawTransaction::coinbase(
            1,
            vec![TxOutput { value: 1, script: p2pkh_script(&owner.public_key()) }],
        );
        node.add_block(vec![coinbase.clone()], 1);

        let tx = spend(coinbase.txid(), 0, vec![0x51], 1);
        let result = node
            .sign_raw_transaction(&tx.to_hex(), &[], &[stranger.to_wif(params.wiftype)])
            .unwrap();
        assert!(!result.complete);
    }

    #[test]
    fn test_price_table() {
        let node = MemoryNode::new(AddressParams::default());
        node.set_price("usd", "kmd", 100, 2 * COIN);
        node.set_price("USD", "KMD", 200, 3 * COIN);

        assert_eq!(node.pax_price(99, "USD", "KMD", COIN), None);
        assert_eq!(node.pax_price(150, "USD", "KMD", COIN), Some(2 * COIN));
        assert_eq!(node.pax_price(250, "USD", "KMD", COIN / 2), Some(3 * COIN / 2));
        assert_eq!(node.pax_price(250, "EUR", "KMD", COIN), None);
    }

    #[test]
    fn test_notaries() {
        let node = MemoryNode::new(AddressParams::default());
        assert!(node.notaries(1).is_none());
        node.set_notaries(vec!["02".to_string() + &"11".repeat(32)]);
        assert_eq!(node.notaries(1).unwrap().len(), 1);
    }
}

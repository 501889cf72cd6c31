//! Backend call router
//!
//! Every logical chain operation goes through [`Router`], which picks the
//! daemon passthrough, the embedded full node, or "unavailable" from the
//! chain's operating mode. Failures never escape as errors: they are logged
//! and surface as `None`, which callers read as "no data yet".

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::client::{DaemonClient, RpcEndpoint, RpcError};
use super::node::{FullNode, KeyStore};
use super::types::{
    coin_amount, BlockInfo, ChainInfo, ChainTip, InputDescriptor, SignResult, TxInfo,
    UnspentOutput,
};
use crate::constants::{MAX_NOTARIES, MAX_SCRIPT_SIZE};
use crate::crypto::{script_address, AddressParams, Hash, PublicKey};

/// How the process reaches a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    /// Separate daemon reached over JSON-RPC
    #[default]
    #[serde(alias = "external")]
    ExternalPassthrough,
    /// Full node running inside this process
    EmbeddedFull,
    /// Light node without direct chain access
    EmbeddedLight,
}

/// Identity of a target chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHandle {
    pub symbol: String,
    pub endpoint: RpcEndpoint,
    pub mode: ChainMode,
    pub params: AddressParams,
}

impl ChainHandle {
    /// Handle for a daemon-backed chain
    pub fn external(symbol: impl Into<String>, endpoint: RpcEndpoint) -> Self {
        Self {
            symbol: symbol.into(),
            endpoint,
            mode: ChainMode::ExternalPassthrough,
            params: AddressParams::default(),
        }
    }

    /// Set address version bytes
    pub fn with_params(mut self, params: AddressParams) -> Self {
        self.params = params;
        self
    }
}

enum Backend {
    Daemon(DaemonClient),
    Node {
        node: Arc<dyn FullNode>,
        keys: Arc<dyn KeyStore>,
    },
    Unavailable,
}

/// Routes chain operations to the backend selected by [`ChainMode`]
pub struct Router {
    handle: ChainHandle,
    backend: Backend,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("handle", &self.handle).finish()
    }
}

impl Router {
    /// Build a router for an external or light chain.
    ///
    /// `EmbeddedFull` needs a node object; use [`Router::with_node`].
    pub fn new(handle: ChainHandle, timeout: Duration) -> Result<Self, RpcError> {
        let backend = match handle.mode {
            ChainMode::ExternalPassthrough => {
                Backend::Daemon(DaemonClient::new(handle.endpoint.clone(), timeout)?)
            }
            ChainMode::EmbeddedLight => Backend::Unavailable,
            ChainMode::EmbeddedFull => return Err(RpcError::MissingNode(handle.symbol)),
        };
        Ok(Self { handle, backend })
    }

    /// Build a router over an in-process full node
    pub fn with_node(
        mut handle: ChainHandle,
        node: Arc<dyn FullNode>,
        keys: Arc<dyn KeyStore>,
    ) -> Self {
        handle.mode = ChainMode::EmbeddedFull;
        Self {
            handle,
            backend: Backend::Node { node, keys },
        }
    }

    /// Router that answers "unavailable" to everything
    pub fn light(mut handle: ChainHandle) -> Self {
        handle.mode = ChainMode::EmbeddedLight;
        Self {
            handle,
            backend: Backend::Unavailable,
        }
    }

    pub fn handle(&self) -> &ChainHandle {
        &self.handle
    }

    pub fn symbol(&self) -> &str {
        &self.handle.symbol
    }

    pub fn mode(&self) -> ChainMode {
        self.handle.mode
    }

    async fn passthru<T: serde::de::DeserializeOwned>(
        &self,
        client: &DaemonClient,
        method: &str,
        params: Value,
    ) -> Option<T> {
        match client.call_as(method, params).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(chain = %self.handle.symbol, method, error = %e, "daemon call unavailable");
                None
            }
        }
    }

    /// Hash of the best block; the zero hash counts as unavailable
    pub async fn best_block_hash(&self) -> Option<Hash> {
        let hash = match &self.backend {
            Backend::Daemon(client) => {
                self.passthru(client, "getbestblockhash", Value::Null).await
            }
            Backend::Node { node, .. } => node.best_block_hash(),
            Backend::Unavailable => None,
        }?;
        hash.is_nonzero().then_some(hash)
    }

    /// Height of the best block (`getinfo.blocks`)
    pub async fn block_count(&self) -> Option<u64> {
        match &self.backend {
            Backend::Daemon(client) => self
                .passthru::<ChainInfo>(client, "getinfo", Value::Null)
                .await
                .map(|info| info.blocks),
            Backend::Node { node, .. } => node.block_count(),
            Backend::Unavailable => None,
        }
    }

    /// Hash of the main-chain block at `height`
    pub async fn get_block_hash(&self, height: u64) -> Option<Hash> {
        match &self.backend {
            Backend::Daemon(client) => self.passthru(client, "getblockhash", json!([height])).await,
            Backend::Node { node, .. } => node.block_hash(height),
            Backend::Unavailable => None,
        }
    }

    /// Verbose block by hash
    pub async fn get_block(&self, hash: &Hash) -> Option<BlockInfo> {
        match &self.backend {
            Backend::Daemon(client) => {
                self.passthru(client, "getblock", json!([hash.to_hex()])).await
            }
            Backend::Node { node, .. } => node.block(hash),
            Backend::Unavailable => None,
        }
    }

    /// Decoded transaction by id
    pub async fn get_raw_transaction(&self, txid: &Hash) -> Option<TxInfo> {
        match &self.backend {
            Backend::Daemon(client) => {
                self.passthru(client, "getrawtransaction", json!([txid.to_hex(), 1]))
                    .await
            }
            Backend::Node { node, .. } => node.raw_transaction(txid),
            Backend::Unavailable => None,
        }
    }

    /// Decode a serialised transaction
    pub async fn decode_raw_transaction(&self, hex: &str) -> Option<TxInfo> {
        match &self.backend {
            Backend::Daemon(client) => {
                self.passthru(client, "decoderawtransaction", json!([hex])).await
            }
            Backend::Node { node, .. } => node.decode_raw_transaction(hex),
            Backend::Unavailable => None,
        }
    }

    /// Unspent outputs of `address`
    pub async fn list_unspent(&self, address: &str) -> Option<Vec<UnspentOutput>> {
        match &self.backend {
            Backend::Daemon(client) => {
                self.passthru(client, "listunspent", json!([0, 99_999_999, [address]]))
                    .await
            }
            Backend::Node { node, .. } => Some(node.list_unspent(address)),
            Backend::Unavailable => None,
        }
    }

    /// Sign a raw transaction.
    ///
    /// The daemon signs with its own wallet. The embedded path resolves each
    /// input's spend script to an address and supplies the matching WIF, or
    /// an empty string when the key is not held; such inputs stay unsigned.
    pub async fn sign_raw_transaction(
        &self,
        hex: &str,
        inputs: &[InputDescriptor],
    ) -> Option<SignResult> {
        match &self.backend {
            Backend::Daemon(client) => {
                self.passthru(client, "signrawtransaction", json!([hex, inputs]))
                    .await
            }
            Backend::Node { node, keys } => {
                let privkeys: Vec<String> = inputs
                    .iter()
                    .map(|input| self.input_wif(keys.as_ref(), input).unwrap_or_default())
                    .collect();
                let result = node.sign_raw_transaction(hex, inputs, &privkeys);
                if let Some(signed) = &result {
                    if !signed.complete {
                        debug!(chain = %self.handle.symbol, "transaction partially signed");
                    }
                }
                result
            }
            Backend::Unavailable => None,
        }
    }

    fn input_wif(&self, keys: &dyn KeyStore, input: &InputDescriptor) -> Option<String> {
        if input.script_pub_key.len() > MAX_SCRIPT_SIZE * 2 {
            return None;
        }
        let script = hex::decode(&input.script_pub_key).ok()?;
        let address = script_address(&script, &self.handle.params).ok()?;
        let key = keys.private_key(&address);
        if key.is_none() {
            debug!(chain = %self.handle.symbol, %address, "no local key for input");
        }
        key.map(|k| k.to_wif(self.handle.params.wiftype))
    }

    /// Broadcast a signed transaction, returning its id
    pub async fn send_raw_transaction(&self, hex: &str) -> Option<Hash> {
        let txid = match &self.backend {
            Backend::Daemon(client) => {
                self.passthru(client, "sendrawtransaction", json!([hex])).await
            }
            Backend::Node { node, .. } => node.send_raw_transaction(hex),
            Backend::Unavailable => None,
        };
        if let Some(txid) = &txid {
            info!(chain = %self.handle.symbol, %txid, "broadcast transaction");
        }
        txid
    }

    /// Notary public keys active at `height`, at most [`MAX_NOTARIES`]
    pub async fn notaries(&self, height: u64) -> Option<Vec<PublicKey>> {
        let keys: Vec<String> = match &self.backend {
            Backend::Daemon(client) => {
                let result: Value = self
                    .passthru(client, "notaries", json!([height.to_string()]))
                    .await?;
                result
                    .get("notaries")?
                    .as_array()?
                    .iter()
                    .map(|item| item["pubkey"].as_str().unwrap_or_default().to_string())
                    .collect()
            }
            Backend::Node { node, .. } => node.notaries(height)?,
            Backend::Unavailable => return None,
        };

        if keys.len() > MAX_NOTARIES {
            warn!(count = keys.len(), "notary list longer than {}, clamping", MAX_NOTARIES);
        }
        let mut notaries = Vec::with_capacity(keys.len().min(MAX_NOTARIES));
        for (i, key) in keys.iter().take(MAX_NOTARIES).enumerate() {
            match PublicKey::from_hex(key) {
                Ok(pubkey) => notaries.push(pubkey),
                Err(_) => warn!(index = i, pubkey = %key, "malformed notary pubkey"),
            }
        }
        Some(notaries)
    }

    /// Reference-chain price of `volume` units of `base` in `rel` units
    pub async fn pax_price(&self, height: u32, base: &str, rel: &str, volume: u64) -> Option<u64> {
        match &self.backend {
            Backend::Daemon(client) => {
                let params = json!([base, rel, height.to_string(), coin_amount::format(volume)]);
                let result: Value = self.passthru(client, "paxprice", params).await?;
                result["price"].as_f64().and_then(coin_amount::from_coins)
            }
            Backend::Node { node, .. } => node.pax_price(height, base, rel, volume),
            Backend::Unavailable => None,
        }
    }

    /// Best block with its height, time and transaction ids
    pub async fn chain_tip(&self) -> Option<ChainTip> {
        let hash = self.best_block_hash().await?;
        let block = self.get_block(&hash).await?;
        if block.height == 0 {
            return None;
        }
        Some(ChainTip {
            hash,
            height: block.height,
            time: block.time,
            txids: block.tx,
        })
    }
}

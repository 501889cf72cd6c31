//! Normalised chain documents
//!
//! Both backends produce these shapes: the daemon path deserialises them from
//! JSON-RPC results, the embedded path builds them directly.

use crate::constants::COIN;
use crate::crypto::Hash;
use serde::{Deserialize, Serialize};

/// Coin-denominated JSON amounts (`1.5`) stored as smallest units.
pub mod coin_amount {
    use super::COIN;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_coins(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let coins = f64::deserialize(deserializer)?;
        from_coins(coins).ok_or_else(|| serde::de::Error::custom("invalid coin amount"))
    }

    /// Convert a coin amount to smallest units, rounding to the nearest unit
    pub fn from_coins(coins: f64) -> Option<u64> {
        if !coins.is_finite() || coins < 0.0 {
            return None;
        }
        let units = (coins * COIN as f64).round();
        if units > u64::MAX as f64 {
            return None;
        }
        Some(units as u64)
    }

    pub fn to_coins(units: u64) -> f64 {
        units as f64 / COIN as f64
    }

    /// Exact `%.8f` rendering of a smallest-unit amount
    pub fn format(units: u64) -> String {
        format!("{}.{:08}", units / COIN, units % COIN)
    }
}

/// Verbose block (`getblock <hash>`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub hash: Hash,
    pub height: u64,
    #[serde(default)]
    pub time: u64,
    /// Transaction ids in block order
    #[serde(default)]
    pub tx: Vec<Hash>,
}

/// Locking script of an output
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScriptPubKey {
    pub hex: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// One transaction output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutInfo {
    #[serde(with = "coin_amount")]
    pub value: u64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

/// Decoded transaction (`getrawtransaction <txid> 1`, `decoderawtransaction`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInfo {
    pub txid: Hash,
    #[serde(default)]
    pub vout: Vec<TxOutInfo>,
}

/// One entry of `listunspent`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub txid: Hash,
    pub vout: u32,
    #[serde(default)]
    pub address: String,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: String,
    #[serde(with = "coin_amount")]
    pub amount: u64,
}

/// Previous-output descriptor handed to the signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub txid: Hash,
    pub vout: u32,
    /// Hex of the spend script being satisfied
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
}

/// Result of `signrawtransaction`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResult {
    pub hex: String,
    pub complete: bool,
}

/// Subset of `getinfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub blocks: u64,
}

/// Current tip of a chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTip {
    pub hash: Hash,
    pub height: u64,
    pub time: u64,
    pub txids: Vec<Hash>,
}

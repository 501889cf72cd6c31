//! Raw transaction codec
//!
//! Legacy (pre-segwit) serialisation as carried by `decoderawtransaction`,
//! `signrawtransaction` and `sendrawtransaction`. Ids are shown byte-reversed
//! as daemons print them.

use thiserror::Error;

use crate::crypto::{script_address, sha256d, AddressParams, Hash};
use crate::rpc::{ScriptPubKey, TxInfo, TxOutInfo};

/// Signature hash type appended to every signature
pub const SIGHASH_ALL: u8 = 0x01;

/// Decode errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxDecodeError {
    #[error("Invalid hex")]
    InvalidHex,
    #[error("Unexpected end of data at offset {0}")]
    UnexpectedEnd(usize),
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
    #[error("Length {0} too large")]
    Oversized(u64),
}

/// A transaction input referencing a previous output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prev_txid: Hash,
    pub vout: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Amount in smallest units
    pub value: u64,
    pub script: Vec<u8>,
}

/// A complete transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl RawTransaction {
    /// Create a version 1 transaction
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: 1,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// Create a coinbase transaction; `height` keeps ids distinct
    pub fn coinbase(height: u32, outputs: Vec<TxOutput>) -> Self {
        let mut script_sig = vec![4];
        script_sig.extend_from_slice(&height.to_le_bytes());
        Self::new(
            vec![TxInput {
                prev_txid: Hash::zero(),
                vout: u32::MAX,
                script_sig,
                sequence: u32::MAX,
            }],
            outputs,
        )
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_txid == Hash::zero()
            && self.inputs[0].vout == u32::MAX
    }

    /// Serialise to bytes
    pub fn encode(&self) -> Vec<u8> {
        self.serialize(None)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Transaction id
    pub fn txid(&self) -> Hash {
        let mut id = sha256d(&self.encode()).0;
        id.reverse();
        Hash(id)
    }

    /// Legacy SIGHASH_ALL digest for input `index` spending `script_code`
    pub fn signature_hash(&self, index: usize, script_code: &[u8]) -> [u8; 32] {
        let mut bytes = self.serialize(Some((index, script_code)));
        bytes.extend_from_slice(&(SIGHASH_ALL as u32).to_le_bytes());
        sha256d(&bytes).0
    }

    fn serialize(&self, signing: Option<(usize, &[u8])>) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.version.to_le_bytes());

        write_compact_size(&mut bytes, self.inputs.len() as u64);
        for (i, input) in self.inputs.iter().enumerate() {
            let mut prev = input.prev_txid.0;
            prev.reverse();
            bytes.extend_from_slice(&prev);
            bytes.extend_from_slice(&input.vout.to_le_bytes());
            let script: &[u8] = match signing {
                None => &input.script_sig,
                Some((index, code)) if index == i => code,
                Some(_) => &[],
            };
            write_compact_size(&mut bytes, script.len() as u64);
            bytes.extend_from_slice(script);
            bytes.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_compact_size(&mut bytes, self.outputs.len() as u64);
        for output in &self.outputs {
            bytes.extend_from_slice(&output.value.to_le_bytes());
            write_compact_size(&mut bytes, output.script.len() as u64);
            bytes.extend_from_slice(&output.script);
        }

        bytes.extend_from_slice(&self.lock_time.to_le_bytes());
        bytes
    }

    /// Parse serialised bytes; the whole input must be consumed
    pub fn decode(data: &[u8]) -> Result<Self, TxDecodeError> {
        let mut reader = Reader { data, pos: 0 };
        let version = i32::from_le_bytes(reader.array()?);

        let input_count = reader.compact_size()?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let mut prev: [u8; 32] = reader.array()?;
            prev.reverse();
            let vout = u32::from_le_bytes(reader.array()?);
            let len = reader.compact_size()?;
            let script_sig = reader.take(len)?.to_vec();
            let sequence = u32::from_le_bytes(reader.array()?);
            inputs.push(TxInput {
                prev_txid: Hash(prev),
                vout,
                script_sig,
                sequence,
            });
        }

        let output_count = reader.compact_size()?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            let value = u64::from_le_bytes(reader.array()?);
            let len = reader.compact_size()?;
            let script = reader.take(len)?.to_vec();
            outputs.push(TxOutput { value, script });
        }

        let lock_time = u32::from_le_bytes(reader.array()?);
        let rest = data.len() - reader.pos;
        if rest != 0 {
            return Err(TxDecodeError::TrailingBytes(rest));
        }
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn from_hex(hex: &str) -> Result<Self, TxDecodeError> {
        let bytes = hex::decode(hex).map_err(|_| TxDecodeError::InvalidHex)?;
        Self::decode(&bytes)
    }

    /// Normalised document as a daemon would return it
    pub fn to_info(&self, params: &AddressParams) -> TxInfo {
        let vout = self
            .outputs
            .iter()
            .enumerate()
            .map(|(n, output)| TxOutInfo {
                value: output.value,
                n: n as u32,
                script_pub_key: ScriptPubKey {
                    hex: hex::encode(&output.script),
                    addresses: script_address(&output.script, params)
                        .map(|address| vec![address])
                        .unwrap_or_default(),
                },
            })
            .collect();
        TxInfo {
            txid: self.txid(),
            vout,
        }
    }
}

fn write_compact_size(bytes: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => bytes.push(n as u8),
        0xfd..=0xffff => {
            bytes.push(0xfd);
            bytes.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            bytes.push(0xfe);
            bytes.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            bytes.push(0xff);
            bytes.extend_from_slice(&n.to_le_bytes());
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: u64) -> Result<&'a [u8], TxDecodeError> {
        let remaining = (self.data.len() - self.pos) as u64;
        if len > remaining {
            return Err(TxDecodeError::UnexpectedEnd(self.pos));
        }
        let start = self.pos;
        self.pos += len as usize;
        Ok(&self.data[start..self.pos])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], TxDecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N as u64)?);
        Ok(out)
    }

    fn compact_size(&mut self) -> Result<u64, TxDecodeError> {
        let n = match self.array::<1>()?[0] {
            0xfd => u16::from_le_bytes(self.array()?) as u64,
            0xfe => u32::from_le_bytes(self.array()?) as u64,
            0xff => u64::from_le_bytes(self.array()?),
            n => n as u64,
        };
        // every counted item takes at least one byte
        if n > (self.data.len() - self.pos) as u64 {
            return Err(TxDecodeError::Oversized(n));
        }
        Ok(n)
    }
}

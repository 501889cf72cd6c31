//! Packed asset metadata
//!
//! A withdrawal carries its asset, amount and destination in 33 bytes laid
//! out like a compressed public key, so it fits wherever a pubkey does:
//!
//! ```text
//! [0]      0x02 | short_flag
//! [1..4]   asset symbol (3 ASCII bytes)
//! [4..12]  amount magnitude, u64 big-endian
//! [12]     destination address version byte
//! [13..33] destination hash160
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::{encode_address, hash160};

/// Encoded size of [`PackedAssetMetadata`]
pub const PACKED_METADATA_LEN: usize = 33;

/// Three-letter upper-case asset code
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssetSymbol(pub [u8; 3]);

impl AssetSymbol {
    /// Build from raw bytes, upper-casing ASCII letters
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        AssetSymbol(bytes.map(|b| b.to_ascii_uppercase()))
    }

    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }
}

impl FromStr for AssetSymbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphanumeric) {
            return Err(format!("invalid asset symbol: {:?}", s));
        }
        Ok(AssetSymbol::from_bytes([bytes[0], bytes[1], bytes[2]]))
    }
}

impl fmt::Display for AssetSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for AssetSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetSymbol({})", self)
    }
}

impl Serialize for AssetSymbol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetSymbol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Decoded form of the 33-byte withdrawal field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedAssetMetadata {
    pub short_flag: bool,
    /// Symbol bytes exactly as carried on the wire
    pub symbol: [u8; 3],
    /// Magnitude; the sign lives in `short_flag`
    pub amount: u64,
    pub address_type: u8,
    pub hash160: [u8; 20],
}

impl PackedAssetMetadata {
    /// Pack into the 33-byte wire form
    pub fn encode(&self) -> [u8; PACKED_METADATA_LEN] {
        let mut out = [0u8; PACKED_METADATA_LEN];
        out[0] = 0x02 | self.short_flag as u8;
        out[1..4].copy_from_slice(&self.symbol);
        out[4..12].copy_from_slice(&self.amount.to_be_bytes());
        out[12] = self.address_type;
        out[13..33].copy_from_slice(&self.hash160);
        out
    }

    /// Unpack the wire form. Every 33-byte input decodes; whether the result
    /// makes sense is for the caller to judge. Only a `0x03` prefix is short.
    pub fn decode(bytes: &[u8; PACKED_METADATA_LEN]) -> Self {
        let mut symbol = [0u8; 3];
        symbol.copy_from_slice(&bytes[1..4]);
        let mut amount = [0u8; 8];
        amount.copy_from_slice(&bytes[4..12]);
        let mut hash160 = [0u8; 20];
        hash160.copy_from_slice(&bytes[13..33]);

        Self {
            short_flag: bytes[0] == 0x03,
            symbol,
            amount: u64::from_be_bytes(amount),
            address_type: bytes[12],
            hash160,
        }
    }

    /// Decode from a slice that must be exactly 33 bytes long
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let fixed: &[u8; PACKED_METADATA_LEN] = bytes.try_into().ok()?;
        Some(Self::decode(fixed))
    }

    /// Amount with the short flag applied as a sign
    pub fn signed_amount(&self) -> i128 {
        if self.short_flag {
            -(self.amount as i128)
        } else {
            self.amount as i128
        }
    }

    /// Upper-cased asset symbol
    pub fn asset(&self) -> AssetSymbol {
        AssetSymbol::from_bytes(self.symbol)
    }

    /// Destination address derived from the address type and hash
    pub fn destination(&self) -> String {
        encode_address(self.address_type, &self.hash160)
    }

    /// Address of the encoded bytes when read as a public key
    pub fn disguised_address(&self, pubtype: u8) -> String {
        encode_address(pubtype, &hash160(&self.encode()))
    }
}

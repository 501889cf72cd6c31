//! PAX bridge core
//!
//! Cross-chain withdrawal accounting for a dPoW notarisation network:
//! a mode-switching chain call router, the packed asset-metadata codec,
//! a reference-chain price oracle, the withdrawal scanner and its ledger,
//! and notary funding-output selection.

pub mod api;
pub mod config;
pub mod crypto;
pub mod node;
pub mod notary;
pub mod pax;
pub mod rpc;
pub mod wallet;

/// Protocol constants
pub mod constants {
    /// Smallest units per coin
    pub const COIN: u64 = 100_000_000;

    /// Symbol of the reference chain
    pub const REFERENCE_SYMBOL: &str = "KMD";

    /// Public-key address version byte of the reference chain
    pub const KOMODO_PUBTYPE: u8 = 60;

    /// Pushed payload length of a withdrawal opret: tag + metadata + height
    pub const PAX_OPRET_LEN: usize = 1 + 33 + 4;

    /// Heights scanned per drive cycle before yielding
    pub const SCAN_BATCH: u32 = 1000;

    /// Upper bound on the notary set
    pub const MAX_NOTARIES: usize = 64;

    /// Largest script accepted from chain data, in bytes
    pub const MAX_SCRIPT_SIZE: usize = 10_000;

    /// Upper bound on unspent outputs examined per funding search
    pub const MAX_UNSPENTS: usize = 10_000;

    /// Notary funding output denomination, in smallest units
    pub const DPOW_UTXO_SIZE: u64 = 10_000;

    /// CRYPTO777 system public key; outputs paying it mark notarisations
    pub const CRYPTO777_PUBKEY: [u8; 33] = [
        0x02, 0x0e, 0x46, 0xe7, 0x9a, 0x2a, 0x8d, 0x12, 0xb9, 0xb5, 0xd1, 0x2c, 0x7a, 0x91, 0xad,
        0xb4, 0xe4, 0x54, 0xed, 0xfa, 0xe4, 0x3c, 0x0a, 0x0c, 0xb8, 0x05, 0x42, 0x7d, 0x2a, 0xc7,
        0x61, 0x3f, 0xd9,
    ];

    /// hash160 of [`CRYPTO777_PUBKEY`]
    pub const CRYPTO777_RMD160: [u8; 20] = [
        0xf1, 0xdc, 0xe4, 0x18, 0x2f, 0xce, 0x87, 0x57, 0x48, 0xc4, 0x98, 0x6b, 0x24, 0x0f, 0xf7,
        0xd7, 0xbc, 0x3f, 0xff, 0xb0,
    ];

}

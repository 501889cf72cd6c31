//! Wallet implementation
//!
//! Holds notary keys in memory and hands them to the embedded signer by
//! address. The wallet does not sign or build transactions itself.

use crate::crypto::{
    decode_address, hash160, wif_decode, AddressError, AddressParams, PrivateKey, PublicKey,
};
use crate::rpc::KeyStore;
use std::collections::HashMap;
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid private key")]
    InvalidKey,
    #[error("Invalid WIF: {0}")]
    InvalidWif(#[from] AddressError),
    #[error("WIF version {found} does not match chain version {expected}")]
    WrongNetwork { expected: u8, found: u8 },
}

/// A wallet key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    pub public_key: PublicKey,
    /// P2PKH address under the wallet's version byte
    pub address: String,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate(pubtype: u8) -> Self {
        Self::from_private_key(PrivateKey::generate(), pubtype)
    }

    /// Import from private key bytes
    pub fn from_private_key_bytes(bytes: &[u8; 32], pubtype: u8) -> Result<Self, WalletError> {
        let private_key = PrivateKey::from_bytes(bytes).map_err(|_| WalletError::InvalidKey)?;
        Ok(Self::from_private_key(private_key, pubtype))
    }

    fn from_private_key(private_key: PrivateKey, pubtype: u8) -> Self {
        let public_key = private_key.public_key();
        let address = public_key.to_address(pubtype);
        Self {
            private_key,
            public_key,
            address,
        }
    }

    /// Export private key bytes
    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.private_key.to_bytes()
    }

    /// Wallet import format under `wiftype`
    pub fn to_wif(&self, wiftype: u8) -> String {
        self.private_key.to_wif(wiftype)
    }

    /// hash160 of the compressed public key
    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(&self.public_key.0)
    }
}

/// In-memory key store
#[derive(Debug, Default)]
pub struct Wallet {
    params: AddressParams,
    /// pubkey hash -> keypair
    keys: HashMap<[u8; 20], KeyPair>,
}

impl Wallet {
    /// Create an empty wallet for a chain's address versions
    pub fn new(params: AddressParams) -> Self {
        Self {
            params,
            keys: HashMap::new(),
        }
    }

    pub fn params(&self) -> &AddressParams {
        &self.params
    }

    /// Generate a new key and add to wallet
    pub fn generate_key(&mut self) -> &KeyPair {
        self.insert(KeyPair::generate(self.params.pubtype))
    }

    /// Import raw key bytes
    pub fn import_key(&mut self, bytes: &[u8; 32]) -> Result<&KeyPair, WalletError> {
        let keypair = KeyPair::from_private_key_bytes(bytes, self.params.pubtype)?;
        Ok(self.insert(keypair))
    }

    /// Import a WIF key; its version byte must be this chain's
    pub fn import_wif(&mut self, wif: &str) -> Result<&KeyPair, WalletError> {
        let (version, bytes) = wif_decode(wif)?;
        if version != self.params.wiftype {
            return Err(WalletError::WrongNetwork {
                expected: self.params.wiftype,
                found: version,
            });
        }
        self.import_key(&bytes)
    }

    fn insert(&mut self, keypair: KeyPair) -> &KeyPair {
        self.keys.entry(keypair.pubkey_hash()).or_insert(keypair)
    }

    /// Get a keypair by address
    pub fn get_key_for_address(&self, address: &str) -> Option<&KeyPair> {
        let (_, rmd160) = decode_address(address).ok()?;
        self.keys.get(&rmd160)
    }

    /// Get all addresses
    pub fn get_addresses(&self) -> Vec<&str> {
        self.keys.values().map(|kp| kp.address.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyStore for Wallet {
    fn private_key(&self, address: &str) -> Option<PrivateKey> {
        self.get_key_for_address(address)
            .map(|kp| kp.private_key.clone())
    }
}

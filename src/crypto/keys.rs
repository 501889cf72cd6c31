//! secp256k1 key material
//!
//! Notary and wallet keys are plain secp256k1 keys; addresses hash the
//! 33-byte compressed public key.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use thiserror::Error;

use super::address::{pubkey_address, wif_encode};

/// Key errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Signing failed")]
    SigningFailed,
}

/// 32-byte private key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// 33-byte compressed public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 33]);

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    /// Create from 32 bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        SigningKey::from_slice(bytes)
            .map(PrivateKey)
            .map_err(|_| KeyError::InvalidPrivateKey)
    }

    /// Get the compressed public key
    pub fn public_key(&self) -> PublicKey {
        let point = self.0.verifying_key().to_encoded_point(true);
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(point.as_bytes());
        PublicKey(bytes)
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }

    /// Wallet import format under the chain's WIF version
    pub fn to_wif(&self, wiftype: u8) -> String {
        wif_encode(wiftype, &self.to_bytes())
    }

    /// DER-encoded low-S ECDSA signature over a 32-byte digest
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, KeyError> {
        let sig: Signature = self
            .0
            .sign_prehash(digest)
            .map_err(|_| KeyError::SigningFailed)?;
        let sig = sig.normalize_s().unwrap_or(sig);
        Ok(sig.to_der().as_bytes().to_vec())
    }
}

impl PublicKey {
    /// Parse a 66 character hex string
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex).map_err(|_| KeyError::InvalidPublicKey)?;
        if bytes.len() != 33 || (bytes[0] != 0x02 && bytes[0] != 0x03) {
            return Err(KeyError::InvalidPublicKey);
        }
        let mut arr = [0u8; 33];
        arr.copy_from_slice(&bytes);
        Ok(PublicKey(arr))
    }

    /// P2PKH address under the given version byte
    pub fn to_address(&self, pubtype: u8) -> String {
        pubkey_address(pubtype, &self.0)
    }

    /// Check a DER signature over a 32-byte digest
    pub fn verify_digest(&self, digest: &[u8; 32], der: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(&self.0) else {
            return false;
        };
        match Signature::from_der(der) {
            Ok(sig) => key.verify_prehash(digest, &sig).is_ok(),
            Err(_) => false,
        }
    }
}

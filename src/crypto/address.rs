//! Base58Check addresses and WIF private keys
//!
//! Address format: Base58(version || hash160 || checksum[0..4]) where the
//! checksum is the first four bytes of sha256d over the payload.

use super::hash::{hash160, sha256d};
use thiserror::Error;

/// Address errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid base58 encoding")]
    InvalidBase58,
    #[error("Invalid address length: {0}")]
    InvalidLength(usize),
    #[error("Invalid checksum")]
    InvalidChecksum,
    #[error("Unsupported script ({0} bytes)")]
    UnsupportedScript(usize),
}

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_EQUAL: u8 = 0x87;
const OP_CHECKSIG: u8 = 0xac;

/// Address version bytes of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AddressParams {
    /// Pay-to-pubkey-hash version
    pub pubtype: u8,
    /// Pay-to-script-hash version
    pub p2shtype: u8,
    /// WIF private key version
    pub wiftype: u8,
}

impl Default for AddressParams {
    fn default() -> Self {
        // Komodo and its asset chains
        Self {
            pubtype: 60,
            p2shtype: 85,
            wiftype: 188,
        }
    }
}

/// Base58Check-encode an arbitrary payload
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = sha256d(payload);
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum.0[0..4]);
    bs58::encode(data).into_string()
}

/// Decode and verify a Base58Check string, returning the payload
pub fn base58check_decode(encoded: &str) -> Result<Vec<u8>, AddressError> {
    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| AddressError::InvalidBase58)?;

    if decoded.len() < 5 {
        return Err(AddressError::InvalidLength(decoded.len()));
    }

    let (payload, checksum) = decoded.split_at(decoded.len() - 4);
    let expected = sha256d(payload);
    if checksum != &expected.0[0..4] {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(payload.to_vec())
}

/// Encode a 20-byte hash under an address version byte
pub fn encode_address(addrtype: u8, rmd160: &[u8; 20]) -> String {
    let mut payload = [0u8; 21];
    payload[0] = addrtype;
    payload[1..].copy_from_slice(rmd160);
    base58check_encode(&payload)
}

/// Decode an address into its version byte and 20-byte hash
pub fn decode_address(address: &str) -> Result<(u8, [u8; 20]), AddressError> {
    let payload = base58check_decode(address)?;
    if payload.len() != 21 {
        return Err(AddressError::InvalidLength(payload.len()));
    }
    let mut rmd160 = [0u8; 20];
    rmd160.copy_from_slice(&payload[1..]);
    Ok((payload[0], rmd160))
}

/// Address of the hash160 of arbitrary bytes (P2PKH of a public key)
pub fn pubkey_address(addrtype: u8, pubkey: &[u8]) -> String {
    encode_address(addrtype, &hash160(pubkey))
}

/// Derive the owning address of a spend script.
///
/// Recognises pay-to-pubkey (compressed and uncompressed), pay-to-pubkey-hash
/// and pay-to-script-hash.
pub fn script_address(script: &[u8], params: &AddressParams) -> Result<String, AddressError> {
    match script {
        [33, key @ .., OP_CHECKSIG] if key.len() == 33 => Ok(pubkey_address(params.pubtype, key)),
        [65, key @ .., OP_CHECKSIG] if key.len() == 65 => Ok(pubkey_address(params.pubtype, key)),
        [OP_DUP, OP_HASH160, 20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            Ok(encode_address(params.pubtype, &to_rmd160(hash)))
        }
        [OP_HASH160, 20, hash @ .., OP_EQUAL] if hash.len() == 20 => {
            Ok(encode_address(params.p2shtype, &to_rmd160(hash)))
        }
        _ => Err(AddressError::UnsupportedScript(script.len())),
    }
}

/// Export a raw private key in wallet import format (compressed)
pub fn wif_encode(wiftype: u8, privkey: &[u8; 32]) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(wiftype);
    payload.extend_from_slice(privkey);
    payload.push(0x01);
    base58check_encode(&payload)
}

/// Parse a WIF string back into its version byte and raw key
pub fn wif_decode(wif: &str) -> Result<(u8, [u8; 32]), AddressError> {
    let payload = base58check_decode(wif)?;
    if payload.len() != 33 && payload.len() != 34 {
        return Err(AddressError::InvalidLength(payload.len()));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&payload[1..33]);
    Ok((payload[0], key))
}

fn to_rmd160(bytes: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERATOR: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn test_bitcoin_address_vector() {
        // Private key 1, compressed, on bitcoin mainnet
        let pubkey = hex::decode(GENERATOR).unwrap();
        assert_eq!(
            pubkey_address(0, &pubkey),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );
    }

    #[test]
    fn test_address_roundtrip() {
        let rmd160 = [7u8; 20];
        let addr = encode_address(60, &rmd160);
        assert!(addr.starts_with('R'));
        assert_eq!(decode_address(&addr).unwrap(), (60, rmd160));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let addr = encode_address(60, &[1u8; 20]);
        let mut chars: Vec<char> = addr.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'a' { 'b' } else { 'a' };
        let tampered: String = chars.into_iter().collect();
        assert_eq!(decode_address(&tampered), Err(AddressError::InvalidChecksum));
        assert_eq!(decode_address("0OIl"), Err(AddressError::InvalidBase58));
    }

    #[test]
    fn test_script_address_forms() {
        let params = AddressParams::default();
        let pubkey = hex::decode(GENERATOR).unwrap();
        let rmd160 = hash160(&pubkey);

        let mut p2pk = vec![33u8];
        p2pk.extend_from_slice(&pubkey);
        p2pk.push(OP_CHECKSIG);

        let mut p2pkh = vec![OP_DUP, OP_HASH160, 20];
        p2pkh.extend_from_slice(&rmd160);
        p2pkh.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);

        let expected = encode_address(params.pubtype, &rmd160);
        assert_eq!(script_address(&p2pk, &params).unwrap(), expected);
        assert_eq!(script_address(&p2pkh, &params).unwrap(), expected);

        let mut p2sh = vec![OP_HASH160, 20];
        p2sh.extend_from_slice(&rmd160);
        p2sh.push(OP_EQUAL);
        assert_eq!(
            script_address(&p2sh, &params).unwrap(),
            encode_address(params.p2shtype, &rmd160)
        );

        assert_eq!(
            script_address(&[0x6a, 0x01, 0x00], &params),
            Err(AddressError::UnsupportedScript(3))
        );
    }

    #[test]
    fn test_wif_vector() {
        // Private key 1, compressed, bitcoin mainnet WIF
        let mut key = [0u8; 32];
        key[31] = 1;
        let wif = wif_encode(0x80, &key);
        assert_eq!(wif, "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn");
        assert_eq!(wif_decode(&wif).unwrap(), (0x80, key));
    }
}

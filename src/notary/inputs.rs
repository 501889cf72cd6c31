//! Own-input detection

use crate::crypto::PublicKey;
use crate::pax::is_p2pk_of;
use crate::rpc::ScriptPubKey;

/// Whether a spent output belongs to `notary`: a 35-byte pay-to-pubkey
/// script carrying its key
pub fn is_own_input(script: &ScriptPubKey, notary: &PublicKey) -> bool {
    if script.hex.len() != 70 {
        return false;
    }
    match hex::decode(&script.hex) {
        Ok(bytes) => is_p2pk_of(&bytes, &notary.0),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;

    #[test]
    fn test_own_p2pk_input() {
        let key = PrivateKey::generate().public_key();
        let script = ScriptPubKey {
            hex: format!("21{}ac", hex::encode(key.0)),
            addresses: vec![],
        };
        assert!(is_own_input(&script, &key));

        let other = PrivateKey::generate().public_key();
        assert!(!is_own_input(&script, &other));
    }

    #[test]
    fn test_other_scripts_not_own() {
        let key = PrivateKey::generate().public_key();
        let p2pkh = ScriptPubKey {
            hex: format!("76a914{}88ac", "00".repeat(20)),
            addresses: vec![],
        };
        assert!(!is_own_input(&p2pkh, &key));
        let junk = ScriptPubKey {
            hex: "zz".repeat(35),
            addresses: vec![],
        };
        assert!(!is_own_input(&junk, &key));
    }
}

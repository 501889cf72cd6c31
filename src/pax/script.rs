//! Null-data script parsing
//!
//! Withdrawal intents ride in `OP_RETURN <push>` outputs whose pushed
//! payload starts with a one-byte tag.

use crate::constants::{CRYPTO777_PUBKEY, CRYPTO777_RMD160};

/// `OP_RETURN`
pub const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_CHECKSIG: u8 = 0xac;

/// Why a script could not be read as a null-data push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpretError {
    /// First byte is not `OP_RETURN`
    NotOpret,
    /// Push opcode outside the three supported forms
    UnsupportedPush(u8),
    /// Declared length runs past the end of the script
    Truncated { declared: usize, available: usize },
}

/// Tag byte of a null-data payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpretTag {
    /// `'W'`: withdrawal intent
    Withdraw,
    /// `'X'`: withdrawal already issued
    Issued,
    /// Anything else
    Other(u8),
}

impl From<u8> for OpretTag {
    fn from(b: u8) -> Self {
        match b {
            b'W' => OpretTag::Withdraw,
            b'X' => OpretTag::Issued,
            other => OpretTag::Other(other),
        }
    }
}

/// Read a push length at the start of `data`.
///
/// Returns `(payload_len, header_len)`. Handles a direct length byte below
/// `0x4c`, `OP_PUSHDATA1 <u8>` and `OP_PUSHDATA2 <u16 le>`.
pub fn push_length(data: &[u8]) -> Result<(usize, usize), OpretError> {
    let truncated = OpretError::Truncated {
        declared: 0,
        available: data.len(),
    };
    match data.first().copied() {
        None => Err(truncated),
        Some(len) if len < OP_PUSHDATA1 => Ok((len as usize, 1)),
        Some(OP_PUSHDATA1) => data.get(1).map(|len| (*len as usize, 2)).ok_or(truncated),
        Some(OP_PUSHDATA2) => match data.get(1..3) {
            Some(len) => Ok((u16::from_le_bytes([len[0], len[1]]) as usize, 3)),
            None => Err(truncated),
        },
        Some(op) => Err(OpretError::UnsupportedPush(op)),
    }
}

/// Extract the pushed payload of an `OP_RETURN` script
pub fn opret_payload(script: &[u8]) -> Result<&[u8], OpretError> {
    if script.first() != Some(&OP_RETURN) {
        return Err(OpretError::NotOpret);
    }
    let body = &script[1..];
    let (len, header) = push_length(body)?;
    let available = body.len() - header;
    if len > available {
        return Err(OpretError::Truncated {
            declared: len,
            available,
        });
    }
    Ok(&body[header..header + len])
}

/// Whether an output script pays the CRYPTO777 system key, which marks
/// notarisation transactions
pub fn is_special_output(script: &[u8]) -> bool {
    match script {
        [33, key @ .., OP_CHECKSIG] if key.len() == 33 => key == &CRYPTO777_PUBKEY[..],
        [OP_DUP, OP_HASH160, 20, rest @ ..] if rest.len() == 22 => {
            &rest[..20] == &CRYPTO777_RMD160[..]
        }
        _ => false,
    }
}

/// Whether `script` is a pay-to-pubkey output of `pubkey`
pub fn is_p2pk_of(script: &[u8], pubkey: &[u8; 33]) -> bool {
    matches!(script, [33, key @ .., OP_CHECKSIG] if key == &pubkey[..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_push() {
        let script = [OP_RETURN, 3, b'W', 1, 2];
        assert_eq!(opret_payload(&script).unwrap(), &[b'W', 1, 2]);
    }

    #[test]
    fn test_pushdata1() {
        let mut script = vec![OP_RETURN, OP_PUSHDATA1, 80];
        script.extend(std::iter::repeat(b'X').take(80));
        assert_eq!(opret_payload(&script).unwrap().len(), 80);
    }

    #[test]
    fn test_pushdata2_little_endian() {
        let mut script = vec![OP_RETURN, OP_PUSHDATA2, 0x2c, 0x01];
        script.extend(std::iter::repeat(0u8).take(300));
        assert_eq!(opret_payload(&script).unwrap().len(), 300);
    }

    #[test]
    fn test_truncated_push_rejected() {
        let script = [OP_RETURN, 10, b'W'];
        assert_eq!(
            opret_payload(&script),
            Err(OpretError::Truncated {
                declared: 10,
                available: 1
            })
        );
        assert!(matches!(
            opret_payload(&[OP_RETURN, OP_PUSHDATA2, 0x01]),
            Err(OpretError::Truncated { .. })
        ));
        assert!(matches!(
            opret_payload(&[OP_RETURN]),
            Err(OpretError::Truncated { .. })
        ));
    }

    #[test]
    fn test_not_opret() {
        assert_eq!(opret_payload(&[OP_DUP]), Err(OpretError::NotOpret));
        assert_eq!(opret_payload(&[]), Err(OpretError::NotOpret));
        assert_eq!(
            opret_payload(&[OP_RETURN, 0x4e, 0, 0, 0, 0]),
            Err(OpretError::UnsupportedPush(0x4e))
        );
    }

    #[test]
    fn test_tags() {
        assert_eq!(OpretTag::from(b'W'), OpretTag::Withdraw);
        assert_eq!(OpretTag::from(b'X'), OpretTag::Issued);
        assert_eq!(OpretTag::from(b'K'), OpretTag::Other(b'K'));
    }

    #[test]
    fn test_special_outputs() {
        let mut p2pk = vec![33u8];
        p2pk.extend_from_slice(&CRYPTO777_PUBKEY);
        p2pk.push(OP_CHECKSIG);
        assert!(is_special_output(&p2pk));

        let mut p2pkh = vec![OP_DUP, OP_HASH160, 20];
        p2pkh.extend_from_slice(&CRYPTO777_RMD160);
        p2pkh.extend_from_slice(&[0x88, OP_CHECKSIG]);
        assert!(is_special_output(&p2pkh));

        p2pkh[5] ^= 0xff;
        assert!(!is_special_output(&p2pkh));
    }

    #[test]
    fn test_p2pk_of() {
        let key = [0x02u8; 33];
        let mut script = vec![33u8];
        script.extend_from_slice(&key);
        script.push(OP_CHECKSIG);
        assert!(is_p2pk_of(&script, &key));
        assert!(!is_p2pk_of(&script, &[0x03u8; 33]));
        assert!(!is_p2pk_of(&script[..34], &key));
    }
}

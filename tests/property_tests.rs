//! Property-based and adversarial tests for the PAX bridge
//!
//! These tests verify codec, ledger and selection invariants under random
//! inputs and hostile chain data.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use pax_bridge::constants::{COIN, CRYPTO777_RMD160, PAX_OPRET_LEN};
use pax_bridge::crypto::{decode_address, encode_address, Hash};
use pax_bridge::notary::select_funding_utxo;
use pax_bridge::pax::{
    is_special_output, opret_payload, IssueFields, Ledger, OpretError, OutputOutcome,
    PackedAssetMetadata, PriceOracle, ScanConfig, WithdrawalScanner, OP_RETURN,
};
use pax_bridge::rpc::{coin_amount, ChainHandle, Router, RpcEndpoint, UnspentOutput};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn fields(amount: u64) -> IssueFields {
    IssueFields {
        symbol: "KMD".parse().unwrap(),
        foreign_amount: amount,
        reference_amount: amount,
        short_flag: false,
        dest_hash160: [7; 20],
        dest_address: encode_address(60, &[7; 20]),
        foreign_height: 1,
    }
}

/// `OP_RETURN` followed by the shortest push of `payload`
fn opret(payload: &[u8]) -> Vec<u8> {
    let mut script = vec![OP_RETURN];
    match payload.len() {
        n if n < 0x4c => script.push(n as u8),
        n if n <= 0xff => script.extend_from_slice(&[0x4c, n as u8]),
        n => {
            script.push(0x4d);
            script.extend_from_slice(&(n as u16).to_le_bytes());
        }
    }
    script.extend_from_slice(payload);
    script
}

fn light_scanner() -> WithdrawalScanner {
    let router = Arc::new(Router::light(ChainHandle::external(
        "DEX",
        RpcEndpoint::local(1),
    )));
    WithdrawalScanner::new(
        router,
        PriceOracle::offline("KMD"),
        Arc::new(Ledger::new()),
        ScanConfig::new("DEX"),
    )
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

proptest! {
    /// Metadata survives packing for every field combination
    #[test]
    fn prop_metadata_roundtrip(
        short_flag in any::<bool>(),
        symbol in any::<[u8; 3]>(),
        amount in any::<u64>(),
        address_type in any::<u8>(),
        hash160 in any::<[u8; 20]>(),
    ) {
        let meta = PackedAssetMetadata { short_flag, symbol, amount, address_type, hash160 };
        let bytes = meta.encode();
        prop_assert!(bytes[0] == 0x02 || bytes[0] == 0x03);
        prop_assert_eq!(PackedAssetMetadata::decode(&bytes), meta);
    }

    /// Any 33 bytes decode, and re-encoding only normalises the prefix byte
    #[test]
    fn prop_decode_total(bytes in proptest::collection::vec(any::<u8>(), 33)) {
        let meta = PackedAssetMetadata::from_slice(&bytes).unwrap();
        let again = meta.encode();
        prop_assert_eq!(&again[1..], &bytes[1..]);
        prop_assert_eq!(again[0], if bytes[0] == 0x03 { 0x03 } else { 0x02 });
    }

    /// The pushed payload comes back for all three push encodings
    #[test]
    fn prop_opret_payload(payload in proptest::collection::vec(any::<u8>(), 0..600)) {
        let script = opret(&payload);
        prop_assert_eq!(opret_payload(&script).unwrap(), &payload[..]);
    }

    /// Exact unit amounts survive the coin-denominated JSON form
    #[test]
    fn prop_coin_amount_roundtrip(units in 0u64..21_000_000 * COIN) {
        prop_assert_eq!(coin_amount::from_coins(coin_amount::to_coins(units)), Some(units));
        let text = coin_amount::format(units);
        prop_assert_eq!(text.split('.').nth(1).map(str::len), Some(8));
    }

    /// One record per txid; the aggregate sums first-seen pending amounts
    #[test]
    fn prop_ledger_unique_and_total(
        inserts in proptest::collection::vec((0u8..16, 1u64..1_000_000), 1..64),
        marked in proptest::collection::vec(0u8..16, 0..8),
    ) {
        let ledger = Ledger::new();
        let mut first_seen: HashMap<u8, u64> = HashMap::new();
        for (n, amount) in &inserts {
            let inserted = ledger.insert_new(Hash::from_bytes([*n; 32]), 0, fields(*amount));
            prop_assert_eq!(inserted, !first_seen.contains_key(n));
            first_seen.entry(*n).or_insert(*amount);
        }
        prop_assert_eq!(ledger.len(), first_seen.len());

        for n in &marked {
            ledger.mark(Hash::from_bytes([*n; 32]), 0, 99);
        }
        let expected: u64 = first_seen
            .iter()
            .filter(|(n, _)| !marked.contains(n))
            .map(|(_, amount)| amount)
            .sum();
        prop_assert_eq!(ledger.total_pending(), expected);
    }

    /// The selected funding output is always one of the exact matches
    #[test]
    fn prop_funding_selection_exact(
        amounts in proptest::collection::vec(prop_oneof![Just(10_000u64), 9_990u64..10_010], 0..40),
        seed in any::<u64>(),
    ) {
        let unspents: Vec<UnspentOutput> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| UnspentOutput {
                txid: Hash::from_bytes([i as u8 + 1; 32]),
                vout: i as u32,
                address: "RNotary".to_string(),
                script_pub_key: String::new(),
                amount: *amount,
            })
            .collect();
        let matches = amounts.iter().filter(|a| **a == 10_000).count();

        let search = select_funding_utxo(&unspents, "RNotary", 10_000, &mut StdRng::seed_from_u64(seed));
        prop_assert_eq!(search.candidates, matches);
        match search.selected {
            Some((_, vout)) => prop_assert_eq!(amounts[vout as usize], 10_000),
            None => prop_assert_eq!(matches, 0),
        }
    }
}

// ============================================================================
// ADVERSARIAL TESTS
// ============================================================================

/// Test: Push length lying about the payload size
#[test]
fn test_truncated_push_rejected() {
    let mut script = vec![OP_RETURN, 0x4d, 0xff, 0xff, b'W'];
    script.extend_from_slice(&[0; 37]);
    assert_eq!(
        opret_payload(&script),
        Err(OpretError::Truncated {
            declared: 0xffff,
            available: 38
        })
    );
    assert_eq!(opret_payload(&[OP_RETURN, 0x4e]), Err(OpretError::UnsupportedPush(0x4e)));
}

/// Test: Over-claim by a single unit
///
/// The output pays one unit more than the metadata declares.
#[tokio::test]
async fn test_overclaim_by_one_unit() {
    let scanner = light_scanner();
    let meta = PackedAssetMetadata {
        short_flag: false,
        symbol: *b"KMD",
        amount: COIN,
        address_type: 60,
        hash160: [1; 20],
    };
    let mut payload = vec![b'W'];
    payload.extend_from_slice(&meta.encode());
    payload.extend_from_slice(&5u32.to_le_bytes());
    assert_eq!(payload.len(), PAX_OPRET_LEN);

    let txid = Hash::from_bytes([3; 32]);
    let outcome = scanner
        .process_output(1, &txid, 0, COIN + 1, &opret(&payload))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        OutputOutcome::OverClaim {
            value: COIN + 1,
            amount: COIN
        }
    );
}

/// Test: Withdrawal payload padded past 38 bytes
#[tokio::test]
async fn test_padded_payload_ignored() {
    let scanner = light_scanner();
    let mut payload = vec![b'W'];
    payload.extend_from_slice(&[0x02; 40]);
    let outcome = scanner
        .process_output(1, &Hash::zero(), 0, 0, &opret(&payload))
        .await
        .unwrap();
    assert_eq!(outcome, OutputOutcome::WrongLength(41));
}

/// Test: Notarisation outputs in both standard forms are recognised
#[test]
fn test_crypto777_p2pkh_special() {
    let mut script = vec![0x76, 0xa9, 20];
    script.extend_from_slice(&CRYPTO777_RMD160);
    script.extend_from_slice(&[0x88, 0xac]);
    assert!(is_special_output(&script));

    script[3] ^= 1;
    assert!(!is_special_output(&script));
}

/// Test: Tampered destination address
#[test]
fn test_tampered_address_rejected() {
    let address = encode_address(60, &[9; 20]);
    assert_eq!(decode_address(&address).unwrap(), (60, [9; 20]));

    let mut chars: Vec<char> = address.chars().collect();
    let last = chars.len() - 1;
    chars[last] = if chars[last] == '1' { '2' } else { '1' };
    let tampered: String = chars.into_iter().collect();
    assert!(decode_address(&tampered).is_err());
}

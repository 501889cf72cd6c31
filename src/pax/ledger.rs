//! PAX withdrawal ledger
//!
//! One record per withdrawal transaction, shared by every scanner worker.
//! Each operation holds the single lock for its whole body and never does
//! I/O inside it.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::codec::AssetSymbol;
use crate::crypto::Hash;

/// A cross-chain withdrawal (`pax_transaction`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub txid: Hash,
    pub vout: u32,
    pub symbol: AssetSymbol,
    /// Amount in foreign-chain units
    pub foreign_amount: u64,
    /// Amount in reference-chain units
    pub reference_amount: u64,
    pub short_flag: bool,
    #[serde(with = "hex_rmd160")]
    pub dest_hash160: [u8; 20],
    pub dest_address: String,
    /// Reference-chain height the withdrawal was priced at
    pub foreign_height: u32,
    /// Height the withdrawal was finalised at; `None` while pending
    pub mark_height: Option<u32>,
}

impl WithdrawalRecord {
    /// Zeroed record keyed only by its outpoint
    pub fn empty(txid: Hash, vout: u32) -> Self {
        Self {
            txid,
            vout,
            ..Default::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.mark_height.is_none()
    }

    fn apply(&mut self, fields: &IssueFields) {
        self.symbol = fields.symbol;
        self.foreign_amount = fields.foreign_amount;
        self.reference_amount = fields.reference_amount;
        self.short_flag = fields.short_flag;
        self.dest_hash160 = fields.dest_hash160;
        self.dest_address = fields.dest_address.clone();
        self.foreign_height = fields.foreign_height;
    }
}

mod hex_rmd160 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 20], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 20], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 20 bytes"))
    }
}

/// Authoritative withdrawal fields written by the scanner and issuer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFields {
    pub symbol: AssetSymbol,
    pub foreign_amount: u64,
    pub reference_amount: u64,
    pub short_flag: bool,
    pub dest_hash160: [u8; 20],
    pub dest_address: String,
    pub foreign_height: u32,
}

/// Write applied by [`Ledger::upsert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalUpdate {
    /// Overwrite the withdrawal fields, leaving the mark untouched
    Issue(IssueFields),
    /// Only finalise at `height`
    Mark { height: u32 },
}

/// Concurrent txid-indexed withdrawal table
#[derive(Debug, Default)]
pub struct Ledger {
    records: Mutex<HashMap<Hash, WithdrawalRecord>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record for `txid`
    pub fn find(&self, txid: &Hash) -> Option<WithdrawalRecord> {
        self.records.lock().get(txid).cloned()
    }

    /// Insert or update the record for `txid`, returning a snapshot
    pub fn upsert(&self, txid: Hash, vout: u32, update: WithdrawalUpdate) -> WithdrawalRecord {
        let mut records = self.records.lock();
        let record = records
            .entry(txid)
            .or_insert_with(|| WithdrawalRecord::empty(txid, vout));
        record.vout = vout;
        match &update {
            WithdrawalUpdate::Issue(fields) => {
                record.apply(fields);
                match record.mark_height {
                    None => info!(
                        %txid, vout, symbol = %fields.symbol, amount = fields.foreign_amount,
                        dest = %fields.dest_address, height = fields.foreign_height,
                        "withdrawal added"
                    ),
                    Some(marked) => info!(
                        %txid, vout, symbol = %fields.symbol, amount = fields.foreign_amount,
                        marked, "withdrawal updated after mark"
                    ),
                }
            }
            WithdrawalUpdate::Mark { height } => {
                record.mark_height = Some(*height);
                info!(%txid, vout, height, "withdrawal marked");
            }
        }
        record.clone()
    }

    /// Insert a fresh record unless one exists for `txid`.
    ///
    /// Returns `false` and leaves the table untouched when the txid is
    /// already present, marked or not.
    pub fn insert_new(&self, txid: Hash, vout: u32, fields: IssueFields) -> bool {
        let mut records = self.records.lock();
        if records.contains_key(&txid) {
            return false;
        }
        let mut record = WithdrawalRecord::empty(txid, vout);
        record.apply(&fields);
        info!(
            %txid, vout, symbol = %fields.symbol, amount = fields.foreign_amount,
            dest = %fields.dest_address, height = fields.foreign_height,
            "withdrawal added"
        );
        records.insert(txid, record);
        true
    }

    /// Finalise `txid` at `height`, creating a zeroed record if absent
    pub fn mark(&self, txid: Hash, vout: u32, height: u32) -> WithdrawalRecord {
        let mut records = self.records.lock();
        let record = records
            .entry(txid)
            .or_insert_with(|| WithdrawalRecord::empty(txid, vout));
        record.mark_height = Some(height);
        info!(%txid, vout, height, "paxmark");
        record.clone()
    }

    /// Sum of foreign amounts over unmarked records
    pub fn total_pending(&self) -> u64 {
        self.records
            .lock()
            .values()
            .filter(|r| r.is_pending())
            .fold(0u64, |total, r| total.saturating_add(r.foreign_amount))
    }

    /// Snapshots of unmarked records
    pub fn pending(&self) -> Vec<WithdrawalRecord> {
        self.records
            .lock()
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(n: u8) -> Hash {
        Hash::from_bytes([n; 32])
    }

    fn fields(amount: u64) -> IssueFields {
        IssueFields {
            symbol: "USD".parse().unwrap(),
            foreign_amount: amount,
            reference_amount: amount * 2,
            short_flag: false,
            dest_hash160: [9u8; 20],
            dest_address: "RDest".to_string(),
            foreign_height: 1000,
        }
    }

    #[test]
    fn test_find_missing() {
        let ledger = Ledger::new();
        assert!(ledger.find(&txid(1)).is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_mark_absent_creates_zeroed_record() {
        let ledger = Ledger::new();
        let record = ledger.mark(txid(1), 3, 500);
        assert_eq!(record.txid, txid(1));
        assert_eq!(record.vout, 3);
        assert_eq!(record.mark_height, Some(500));
        assert_eq!(record.foreign_amount, 0);
        assert_eq!(record.dest_hash160, [0u8; 20]);
        assert_eq!(ledger.find(&txid(1)), Some(record));
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let ledger = Ledger::new();
        ledger.upsert(txid(1), 0, WithdrawalUpdate::Issue(fields(10)));
        ledger.upsert(txid(1), 0, WithdrawalUpdate::Issue(fields(20)));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.find(&txid(1)).unwrap().foreign_amount, 20);
    }

    #[test]
    fn test_mark_only_update_keeps_fields() {
        let ledger = Ledger::new();
        ledger.upsert(txid(1), 0, WithdrawalUpdate::Issue(fields(10)));
        let record = ledger.upsert(txid(1), 0, WithdrawalUpdate::Mark { height: 77 });
        assert_eq!(record.foreign_amount, 10);
        assert_eq!(record.mark_height, Some(77));

        // a later issue keeps the mark
        let record = ledger.upsert(txid(1), 0, WithdrawalUpdate::Issue(fields(11)));
        assert_eq!(record.mark_height, Some(77));
    }

    #[test]
    fn test_insert_new_is_idempotent() {
        let ledger = Ledger::new();
        assert!(ledger.insert_new(txid(1), 0, fields(10)));
        assert!(!ledger.insert_new(txid(1), 0, fields(99)));
        assert_eq!(ledger.find(&txid(1)).unwrap().foreign_amount, 10);

        ledger.mark(txid(2), 0, 5);
        assert!(!ledger.insert_new(txid(2), 0, fields(10)));
        assert_eq!(ledger.find(&txid(2)).unwrap().foreign_amount, 0);
    }

    #[test]
    fn test_total_pending() {
        let ledger = Ledger::new();
        ledger.insert_new(txid(1), 0, fields(10));
        ledger.insert_new(txid(2), 0, fields(20));
        ledger.insert_new(txid(3), 0, fields(30));
        assert_eq!(ledger.total_pending(), 60);

        ledger.mark(txid(2), 0, 100);
        assert_eq!(ledger.total_pending(), 40);
        assert_eq!(ledger.pending().len(), 2);
    }

    #[test]
    fn test_concurrent_writers() {
        use std::sync::Arc;

        let ledger = Arc::new(Ledger::new());
        let handles: Vec<_> = (0..8u8)
            .map(|worker| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for n in 0..32u8 {
                        ledger.insert_new(txid(n), worker as u32, fields(1));
                        if n % 4 == 0 {
                            ledger.mark(txid(n), 0, 10);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ledger.len(), 32);
        assert_eq!(ledger.total_pending(), 24);
    }

    #[test]
    fn test_record_json() {
        let ledger = Ledger::new();
        let record = ledger.upsert(txid(1), 0, WithdrawalUpdate::Issue(fields(10)));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["symbol"], "USD");
        assert_eq!(json["dest_hash160"], hex::encode([9u8; 20]));
        assert!(json["mark_height"].is_null());
    }
}

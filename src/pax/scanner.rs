//! Withdrawal scanner
//!
//! Walks a foreign chain height by height, transaction by transaction and
//! output by output, looking for `'W'` withdrawal oprets. Accepted intents
//! are priced against the reference chain and committed to the [`Ledger`].
//!
//! A fetch failure stops the batch at the current height, which is retried
//! on the next cycle. A malformed or unpriced output is skipped.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::codec::PackedAssetMetadata;
use super::ledger::{IssueFields, Ledger};
use super::oracle::PriceOracle;
use super::script::{is_special_output, opret_payload, OpretError, OpretTag, OP_RETURN};
use crate::constants::{MAX_SCRIPT_SIZE, PAX_OPRET_LEN, REFERENCE_SYMBOL, SCAN_BATCH};
use crate::crypto::Hash;
use crate::rpc::{Router, TxOutInfo};

/// Scan errors. Each one leaves the height cursor where it was.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("Chain tip unavailable")]
    TipUnavailable,
    #[error("Block hash unavailable at height {0}")]
    HashUnavailable(u32),
    #[error("Block {0} unavailable")]
    BlockUnavailable(Hash),
    #[error("Transaction {0} unavailable")]
    TransactionUnavailable(Hash),
}

/// Where the scanner is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    ScanningHeight(u32),
    ScanningTx { height: u32, txi: usize },
    Done,
}

/// What happened to one output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputOutcome {
    /// Not a null-data script
    NotOpret,
    /// Null-data script that could not be read
    Malformed(OpretError),
    /// Script longer than the accepted maximum
    Oversized(usize),
    /// Payload with an unrecognised tag
    OtherTag(u8),
    /// `'X'` marker of an already issued withdrawal
    Issued,
    /// `'W'` on the reference chain itself
    ReferenceChain,
    /// `'W'` payload of the wrong length
    WrongLength(usize),
    /// Position polarity differs from the chain's
    PolarityMismatch,
    /// Output value exceeds the claimed amount
    OverClaim { value: u64, amount: u64 },
    /// Short position backed by less than it claims
    Undercollateralised { value: u64, amount: u64 },
    /// Valid, but the txid is already in the ledger
    AlreadyRecorded,
    /// New record written to the ledger
    Committed,
    /// Valid short position; shorts are not committed here
    ShortUncommitted,
    /// No reference price for the asset at the quoted height
    PriceUnavailable { symbol: String, height: u32 },
}

/// Scanner settings for one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Symbol of the chain being scanned
    pub symbol: String,
    pub reference_symbol: String,
    /// Polarity this chain accepts
    pub short_flag: bool,
    pub start_height: u32,
    /// Heights per drive cycle
    pub batch_size: u32,
    /// Pause between heights
    pub pace: Duration,
    /// Pause after a failed cycle
    pub backoff: Duration,
    /// Pause once caught up with the tip
    pub poll: Duration,
}

impl ScanConfig {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            reference_symbol: REFERENCE_SYMBOL.to_string(),
            short_flag: false,
            start_height: 1,
            batch_size: SCAN_BATCH,
            pace: Duration::from_millis(10),
            backoff: Duration::from_secs(3),
            poll: Duration::from_secs(1),
        }
    }

    pub fn with_short(mut self, short_flag: bool) -> Self {
        self.short_flag = short_flag;
        self
    }

    pub fn with_start_height(mut self, height: u32) -> Self {
        self.start_height = height;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set pace, backoff and poll intervals
    pub fn with_timing(mut self, pace: Duration, backoff: Duration, poll: Duration) -> Self {
        self.pace = pace;
        self.backoff = backoff;
        self.poll = poll;
        self
    }

    fn is_reference_chain(&self) -> bool {
        self.symbol.eq_ignore_ascii_case(&self.reference_symbol)
    }
}

/// Result of one drive cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    /// Next height to scan
    pub next_height: u32,
    /// Chain tip seen this cycle
    pub tip: Option<u32>,
    /// Heights fully scanned
    pub scanned: u32,
    /// Records written to the ledger
    pub committed: usize,
    /// Unix time at which the scanner caught up, if it did
    pub realtime: Option<u64>,
    /// Error that ended the cycle early
    pub error: Option<ScanError>,
}

/// Per-block totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockSummary {
    pub transactions: usize,
    pub special: usize,
    pub committed: usize,
}

/// Scanner for one foreign chain
pub struct WithdrawalScanner {
    router: Arc<Router>,
    oracle: PriceOracle,
    ledger: Arc<Ledger>,
    config: ScanConfig,
    height: u32,
    state: ScanState,
}

impl WithdrawalScanner {
    pub fn new(
        router: Arc<Router>,
        oracle: PriceOracle,
        ledger: Arc<Ledger>,
        config: ScanConfig,
    ) -> Self {
        let height = config.start_height.max(1);
        Self {
            router,
            oracle,
            ledger,
            config,
            height,
            state: ScanState::Idle,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Next height to scan
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan up to one batch of heights towards the tip
    pub async fn iteration(&mut self) -> IterationReport {
        let mut report = IterationReport {
            next_height: self.height,
            tip: None,
            scanned: 0,
            committed: 0,
            realtime: None,
            error: None,
        };

        let tip = match self.router.block_count().await {
            Some(tip) => u32::try_from(tip).unwrap_or(u32::MAX),
            None => {
                warn!(chain = %self.config.symbol, "chain tip unavailable");
                self.state = ScanState::Idle;
                report.error = Some(ScanError::TipUnavailable);
                return report;
            }
        };
        report.tip = Some(tip);

        while report.scanned < self.config.batch_size && self.height <= tip {
            match self.scan_block(self.height).await {
                Ok(summary) => {
                    report.committed += summary.committed;
                    report.scanned += 1;
                    self.height += 1;
                }
                Err(e) => {
                    warn!(chain = %self.config.symbol, height = self.height, error = %e, "scan stopped");
                    report.error = Some(e);
                    break;
                }
            }
            if !self.config.pace.is_zero() {
                tokio::time::sleep(self.config.pace).await;
            }
        }

        self.state = ScanState::Idle;
        report.next_height = self.height;
        if report.error.is_none() && self.height > tip {
            report.realtime = Some(unix_time());
        }
        debug!(
            chain = %self.config.symbol,
            next = report.next_height, tip, scanned = report.scanned,
            committed = report.committed, "scan iteration"
        );
        report
    }

    /// Scan every transaction of the block at `height`
    pub async fn scan_block(&mut self, height: u32) -> Result<BlockSummary, ScanError> {
        self.state = ScanState::ScanningHeight(height);
        let hash = self
            .router
            .get_block_hash(height as u64)
            .await
            .ok_or(ScanError::HashUnavailable(height))?;
        let block = self
            .router
            .get_block(&hash)
            .await
            .ok_or(ScanError::BlockUnavailable(hash))?;

        let mut summary = BlockSummary::default();
        for (txi, txid) in block.tx.iter().enumerate() {
            self.state = ScanState::ScanningTx { height, txi };
            let outcomes = self.scan_transaction(height, txid).await?;
            summary.transactions += 1;
            match outcomes {
                None => summary.special += 1,
                Some(outcomes) => {
                    summary.committed += outcomes
                        .iter()
                        .filter(|o| **o == OutputOutcome::Committed)
                        .count();
                }
            }
        }
        Ok(summary)
    }

    /// Examine each output of `txid`.
    ///
    /// Returns `None` when output 0 pays the CRYPTO777 key; such
    /// notarisation transactions are not withdrawal candidates.
    pub async fn scan_transaction(
        &self,
        height: u32,
        txid: &Hash,
    ) -> Result<Option<Vec<OutputOutcome>>, ScanError> {
        let tx = self
            .router
            .get_raw_transaction(txid)
            .await
            .ok_or(ScanError::TransactionUnavailable(*txid))?;

        let mut outcomes = Vec::with_capacity(tx.vout.len());
        for output in &tx.vout {
            let script = match decode_script(output) {
                Ok(script) => script,
                Err(outcome) => {
                    debug!(%txid, vout = output.n, ?outcome, "output skipped");
                    outcomes.push(outcome);
                    continue;
                }
            };
            if output.n == 0 && is_special_output(&script) {
                debug!(%txid, height, "special transaction");
                return Ok(None);
            }
            let outcome = self
                .process_output(height, &tx.txid, output.n, output.value, &script)
                .await?;
            outcomes.push(outcome);
        }
        Ok(Some(outcomes))
    }

    /// Decide one output, committing it when it is an acceptable withdrawal
    pub async fn process_output(
        &self,
        height: u32,
        txid: &Hash,
        vout: u32,
        value: u64,
        script: &[u8],
    ) -> Result<OutputOutcome, ScanError> {
        if script.first() != Some(&OP_RETURN) {
            return Ok(OutputOutcome::NotOpret);
        }
        let payload = match opret_payload(script) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%txid, vout, error = ?e, "malformed opret");
                return Ok(OutputOutcome::Malformed(e));
            }
        };
        let Some(&tag) = payload.first() else {
            return Ok(OutputOutcome::Malformed(OpretError::Truncated {
                declared: 0,
                available: 0,
            }));
        };

        match OpretTag::from(tag) {
            OpretTag::Withdraw => {}
            OpretTag::Issued => {
                debug!(%txid, vout, height, value, "withdrawal issued");
                return Ok(OutputOutcome::Issued);
            }
            OpretTag::Other(tag) => return Ok(OutputOutcome::OtherTag(tag)),
        }
        if self.config.is_reference_chain() {
            return Ok(OutputOutcome::ReferenceChain);
        }
        debug!(%txid, vout, height, value, len = payload.len(), "withdraw opret");
        if payload.len() != PAX_OPRET_LEN {
            return Ok(OutputOutcome::WrongLength(payload.len()));
        }

        let Some(meta) = PackedAssetMetadata::from_slice(&payload[1..34]) else {
            return Ok(OutputOutcome::WrongLength(payload.len()));
        };
        let price_height = u32::from_le_bytes([payload[34], payload[35], payload[36], payload[37]]);
        let amount = meta.amount;

        if meta.short_flag != self.config.short_flag {
            return Ok(OutputOutcome::PolarityMismatch);
        }
        if meta.short_flag {
            if value >= amount {
                debug!(%txid, vout, value, amount, "short withdrawal not committed");
                return Ok(OutputOutcome::ShortUncommitted);
            }
            return Ok(OutputOutcome::Undercollateralised { value, amount });
        }
        if value > amount {
            debug!(%txid, vout, value, amount, "withdrawal over-claims");
            return Ok(OutputOutcome::OverClaim { value, amount });
        }
        if self.ledger.find(txid).is_some() {
            return Ok(OutputOutcome::AlreadyRecorded);
        }

        let symbol = meta.asset();
        let base = symbol.to_string();
        let reference_amount = if self.oracle.is_reference(&base) {
            amount
        } else {
            let quoted = self
                .oracle
                .quote(price_height, &base, &self.config.reference_symbol, amount)
                .await;
            if quoted == 0 {
                warn!(%txid, vout, symbol = %base, height = price_height, "no price, withdrawal skipped");
                return Ok(OutputOutcome::PriceUnavailable {
                    symbol: base,
                    height: price_height,
                });
            }
            quoted
        };

        let fields = IssueFields {
            symbol,
            foreign_amount: amount,
            reference_amount,
            short_flag: meta.short_flag,
            dest_hash160: meta.hash160,
            dest_address: meta.destination(),
            foreign_height: price_height,
        };
        if self.ledger.insert_new(*txid, vout, fields) {
            Ok(OutputOutcome::Committed)
        } else {
            Ok(OutputOutcome::AlreadyRecorded)
        }
    }

    /// Drive iterations until `shutdown` turns true
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(chain = %self.config.symbol, height = self.height, "scanner started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = self.iteration().await;
            let delay = if report.error.is_some() {
                self.config.backoff
            } else if report.realtime.is_some() {
                self.config.poll
            } else {
                Duration::ZERO
            };
            if report.committed > 0 {
                info!(
                    chain = %self.config.symbol,
                    committed = report.committed,
                    pending = self.ledger.total_pending(),
                    "withdrawals committed"
                );
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        self.state = ScanState::Done;
        info!(chain = %self.config.symbol, height = self.height, "scanner stopped");
    }
}

fn decode_script(output: &TxOutInfo) -> Result<Vec<u8>, OutputOutcome> {
    let hex = &output.script_pub_key.hex;
    if hex.len() > MAX_SCRIPT_SIZE * 2 {
        return Err(OutputOutcome::Oversized(hex.len() / 2));
    }
    hex::decode(hex).map_err(|_| OutputOutcome::NotOpret)
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

//! Reference-chain price oracle
//!
//! Converts foreign-asset amounts into reference-chain units using the
//! `paxprice` feed of the reference chain at a historical height.

use std::sync::Arc;

use tracing::{debug, warn};

use super::codec::{AssetSymbol, PackedAssetMetadata};
use crate::crypto::{decode_address, AddressError};
use crate::rpc::Router;

/// Quotes prices from the reference chain
#[derive(Debug, Clone)]
pub struct PriceOracle {
    reference: Option<Arc<Router>>,
    reference_symbol: String,
}

/// Reference-chain destination of a fiat withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiatDestination {
    /// Quoted value in reference-chain units (0 when unavailable)
    pub reference_amount: u64,
    pub metadata: PackedAssetMetadata,
    /// P2PKH address of the metadata bytes read as a public key
    pub address: String,
}

impl PriceOracle {
    /// Oracle backed by the reference chain's router
    pub fn new(reference: Arc<Router>) -> Self {
        let reference_symbol = reference.symbol().to_ascii_uppercase();
        Self {
            reference: Some(reference),
            reference_symbol,
        }
    }

    /// Oracle with no reference chain; every foreign quote is zero
    pub fn offline(reference_symbol: impl Into<String>) -> Self {
        Self {
            reference: None,
            reference_symbol: reference_symbol.into().to_ascii_uppercase(),
        }
    }

    pub fn reference_symbol(&self) -> &str {
        &self.reference_symbol
    }

    /// Price `volume` units of `foreign` in `reference` units at `height`.
    ///
    /// Returns 0 without a call when the symbols are equal, and 0 when the
    /// price cannot be fetched. A zero for a non-reference symbol means
    /// "unavailable", not a real price.
    pub async fn quote(&self, height: u32, foreign: &str, reference: &str, volume: u64) -> u64 {
        if foreign.eq_ignore_ascii_case(reference) {
            return 0;
        }
        let Some(router) = &self.reference else {
            debug!(%foreign, "no reference chain for price quote");
            return 0;
        };
        match router.pax_price(height, foreign, reference, volume).await {
            Some(price) => price,
            None => {
                warn!(%foreign, %reference, height, "price unavailable");
                0
            }
        }
    }

    /// Whether `symbol` is the reference asset itself
    pub fn is_reference(&self, symbol: &str) -> bool {
        symbol.eq_ignore_ascii_case(&self.reference_symbol)
    }

    /// Build the packed destination for moving `fiatoshis` of `symbol`
    /// to `dest_address`.
    ///
    /// A negative `fiatoshis` is a short position. Returns `Ok(None)` for the
    /// reference asset, which has no fiat destination. With
    /// `to_reference` the metadata carries the quoted reference amount,
    /// otherwise the fiat amount.
    pub async fn fiat_destination(
        &self,
        to_reference: bool,
        dest_address: &str,
        height: u32,
        symbol: &str,
        fiatoshis: i64,
        pubtype: u8,
    ) -> Result<Option<FiatDestination>, AddressError> {
        let symbol: AssetSymbol = match symbol.get(..3).and_then(|s| s.parse().ok()) {
            Some(symbol) => symbol,
            None => return Ok(None),
        };
        let base = symbol.to_string();
        if self.is_reference(&base) {
            return Ok(None);
        }

        let short_flag = fiatoshis < 0;
        let volume = fiatoshis.unsigned_abs();
        let (address_type, hash160) = decode_address(dest_address)?;
        let reference_amount = self
            .quote(height, &base, &self.reference_symbol, volume)
            .await;

        let metadata = PackedAssetMetadata {
            short_flag,
            symbol: *symbol.as_bytes(),
            amount: if to_reference { reference_amount } else { volume },
            address_type,
            hash160,
        };
        Ok(Some(FiatDestination {
            reference_amount,
            address: metadata.disguised_address(pubtype),
            metadata,
        }))
    }
}

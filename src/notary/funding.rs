//! Funding-output selection
//!
//! Notarisations spend one output of an exact denomination from the
//! notary's address. When several qualify the pick is randomised so the
//! same output is not always reused.

use rand::Rng;
use tracing::warn;

use crate::constants::MAX_UNSPENTS;
use crate::crypto::Hash;
use crate::rpc::{Router, UnspentOutput};

/// Outcome of a funding search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingSearch {
    /// Chosen outpoint
    pub selected: Option<(Hash, u32)>,
    /// Outputs that matched amount and address
    pub candidates: usize,
}

impl FundingSearch {
    pub fn needs_funding(&self) -> bool {
        self.candidates == 0
    }
}

/// Pick an output of exactly `amount` owned by `address`.
///
/// The first match is always taken, each later match replaces it with
/// probability `1 / (n/2 + 1)` where `n` is the number of listed outputs.
/// This is not a uniform choice.
pub fn select_funding_utxo<R: Rng>(
    unspents: &[UnspentOutput],
    address: &str,
    amount: u64,
    rng: &mut R,
) -> FundingSearch {
    let listed = if unspents.len() > MAX_UNSPENTS {
        warn!(count = unspents.len(), "unspent list longer than {}, clamping", MAX_UNSPENTS);
        &unspents[..MAX_UNSPENTS]
    } else {
        unspents
    };
    let n = listed.len();

    let mut search = FundingSearch {
        selected: None,
        candidates: 0,
    };
    for utxo in listed {
        if utxo.amount != amount || utxo.address != address || !utxo.txid.is_nonzero() {
            continue;
        }
        if search.selected.is_none() || rng.gen_range(0..n / 2 + 1) == 0 {
            search.selected = Some((utxo.txid, utxo.vout));
        }
        search.candidates += 1;
    }
    search
}

/// List `address`'s unspents and pick a funding output of `amount`
pub async fn find_funding_utxo(router: &Router, address: &str, amount: u64) -> FundingSearch {
    let unspents = router.list_unspent(address).await.unwrap_or_default();
    let search = select_funding_utxo(&unspents, address, amount, &mut rand::thread_rng());
    if search.needs_funding() {
        warn!(chain = %router.symbol(), %address, "no utxo: needs funding");
    }
    search
}

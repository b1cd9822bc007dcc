//! Best-effort price enrichment
//!
//! Oracle lookups run outside any store transaction: the card is read, the
//! store is released while the oracle is awaited, and the answer is merged in
//! a separate short unit. Nothing here can fail or roll back a ledger write;
//! every problem is downgraded to [`PriceRefresh::Unavailable`].

use crate::engine::{require_card, Inventory, Reconciliation, SaleReceipt};
use crate::error::{LedgerError, Result};
use crate::model::CardId;
use crate::store::LedgerStore;
use std::fmt;
use tcg_common::{lookup, PriceObservation, PriceOracle};

/// Non-fatal report that a card's price could not be refreshed
#[derive(Debug, Clone, PartialEq)]
pub struct OracleUnavailable {
    pub card_id: CardId,
    pub reason: String,
}

impl fmt::Display for OracleUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "price unavailable for {}: {}", self.card_id, self.reason)
    }
}

/// Result of asking the oracle about one card
#[derive(Debug, Clone, PartialEq)]
pub enum PriceRefresh {
    /// New last-known price
    Accepted(PriceObservation),
    /// Oracle answered with nothing newer than `current`
    Stale(PriceObservation),
    /// Oracle found no sold listing
    NoResult,
    Unavailable(OracleUnavailable),
}

impl PriceRefresh {
    /// Warning text for anything that did not update the price
    pub fn warning(&self) -> Option<String> {
        match self {
            PriceRefresh::Unavailable(unavailable) => Some(unavailable.to_string()),
            _ => None,
        }
    }
}

impl<S: LedgerStore> Inventory<S> {
    /// Ask `oracle` for the card's latest sold price and merge the answer.
    ///
    /// Never returns an error: timeouts, transport failures, malformed
    /// answers and store errors come back as [`PriceRefresh::Unavailable`]
    /// and are logged as warnings.
    pub async fn refresh_price<O: PriceOracle>(
        &self,
        oracle: &O,
        card_id: &CardId,
    ) -> PriceRefresh {
        let unavailable = |reason: String| {
            let report = OracleUnavailable {
                card_id: card_id.clone(),
                reason,
            };
            log::warn!("{}", report);
            PriceRefresh::Unavailable(report)
        };

        let query = match self.store().read(|tx| require_card(tx, card_id)) {
            Ok(card) => card.query(),
            Err(e) => return unavailable(e.to_string()),
        };

        let observation = match lookup(oracle, &query, self.oracle_timeout()).await {
            Ok(observation) => observation,
            Err(e) => return unavailable(e.to_string()),
        };

        match self.reconcile_price(card_id, observation) {
            Ok(Reconciliation::Accepted(observation)) => PriceRefresh::Accepted(observation),
            Ok(Reconciliation::Stale { current }) => PriceRefresh::Stale(current),
            Ok(Reconciliation::NoObservation) => {
                log::info!("No sold listings found for '{}'", query);
                PriceRefresh::NoResult
            }
            Err(e) => unavailable(e.to_string()),
        }
    }

    /// Sell at the card's market price.
    ///
    /// Refreshes the price first; if no price is known afterwards the sale is
    /// refused with a validation error and the ledger is untouched.
    pub async fn sell_at_market<O: PriceOracle>(
        &self,
        oracle: &O,
        username: &str,
        card_id: &CardId,
        quantity: i64,
    ) -> Result<(SaleReceipt, PriceRefresh)> {
        let refresh = self.refresh_price(oracle, card_id).await;

        let card = self.card(card_id)?;
        let price = card.last_price.map(|o| o.price).ok_or_else(|| {
            LedgerError::Validation(format!(
                "no sale price given and no market price known for {}",
                card
            ))
        })?;

        log::info!("Using last sold price {:.2} for {}", price, card);
        let receipt = self.sell(username, card_id, quantity, price)?;
        Ok((receipt, refresh))
    }

    /// Free-form price search; touches no ledger state
    pub async fn search_price<O: PriceOracle>(
        &self,
        oracle: &O,
        query: &str,
    ) -> Option<PriceObservation> {
        match lookup(oracle, query, self.oracle_timeout()).await {
            Ok(observation) => observation,
            Err(e) => {
                log::warn!("Price search for '{}' failed: {}", query, e);
                None
            }
        }
    }
}

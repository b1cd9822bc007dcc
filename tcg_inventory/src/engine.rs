//! Inventory engine
//!
//! Enforces the ownership rules of the ledger:
//! - holding quantities never go negative,
//! - for every card, total held == total purchased - total sold,
//! - cost basis follows average-cost accounting on every withdrawal.
//!
//! Each operation is a single [`LedgerStore::atomically`] unit, so a failed
//! operation leaves the store exactly as it was.

use crate::error::{LedgerError, Result};
use crate::model::{
    Card, CardId, Holding, NewCard, NewTransaction, Transaction, TransactionKind, User,
};
use crate::store::{LedgerStore, LedgerTx};
use chrono::Utc;
use std::time::Duration;
use tcg_common::PriceObservation;

/// Default upper bound for a single price oracle lookup
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a successful sale
#[derive(Debug, Clone, PartialEq)]
pub struct SaleReceipt {
    pub transaction: Transaction,
    /// quantity * unit price
    pub proceeds: f64,
    /// Cost basis that left the holding with the sold units
    pub cost_removed: f64,
    pub realized_gain: f64,
}

/// What reconciling one observation did to a card
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Observation was newer and is now the last-known price
    Accepted(PriceObservation),
    /// Observation was not newer than `current`; nothing changed
    Stale { current: PriceObservation },
    /// Oracle had nothing to offer
    NoObservation,
}

/// The ledger's business rules on top of a [`LedgerStore`]
pub struct Inventory<S> {
    store: S,
    oracle_timeout: Duration,
}

impl<S: LedgerStore> Inventory<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn oracle_timeout(&self) -> Duration {
        self.oracle_timeout
    }

    /// Read access for reporting
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a new user. Usernames are unique and case-sensitive.
    pub fn register_user(
        &self,
        username: &str,
        display_name: &str,
        email: Option<&str>,
    ) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(LedgerError::validation("username must not be empty"));
        }
        let display_name = match display_name.trim() {
            "" => username,
            name => name,
        };

        let user = User {
            username: username.to_string(),
            display_name: display_name.to_string(),
            email: email
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            created_at: Utc::now(),
        };

        self.store.atomically(|tx| {
            if tx.get_user(&user.username)?.is_some() {
                return Err(LedgerError::Validation(format!(
                    "user '{}' already exists",
                    user.username
                )));
            }
            tx.put_user(&user)
        })?;

        log::info!("Registered user '{}'", user.username);
        Ok(user)
    }

    /// Remove a user who no longer owns anything
    pub fn remove_user(&self, username: &str) -> Result<()> {
        self.store.atomically(|tx| {
            require_user(tx, username)?;
            let owned = tx
                .holdings_for_user(username)?
                .into_iter()
                .filter(|h| !h.is_empty())
                .count();
            if owned > 0 {
                return Err(LedgerError::Validation(format!(
                    "user '{}' still owns {} card(s)",
                    username, owned
                )));
            }
            tx.delete_user(username)
        })?;

        log::info!("Removed user '{}'", username);
        Ok(())
    }

    /// Return the card for these attributes, creating it on first reference
    pub fn register_card(&self, card: &NewCard) -> Result<Card> {
        validate_card(card)?;
        self.store.atomically(|tx| ensure_card(tx, card))
    }

    pub fn card(&self, card_id: &CardId) -> Result<Card> {
        self.store.read(|tx| require_card(tx, card_id))
    }

    pub fn holding(&self, username: &str, card_id: &CardId) -> Result<Holding> {
        self.store.read(|tx| {
            Ok(tx
                .get_holding(username, card_id)?
                .unwrap_or_else(|| Holding::empty(username, card_id)))
        })
    }

    /// Buy `quantity` copies at `unit_price` each into `username`'s holding
    pub fn purchase(
        &self,
        username: &str,
        card: &NewCard,
        quantity: i64,
        unit_price: f64,
    ) -> Result<Transaction> {
        validate_quantity(quantity)?;
        validate_price(unit_price)?;
        validate_card(card)?;

        let cost = total_price(quantity, unit_price)?;
        let transaction = self.store.atomically(|tx| {
            require_user(tx, username)?;
            let card = ensure_card(tx, card)?;

            let mut holding = load_holding(tx, username, &card.id)?;
            holding.deposit(quantity, cost)?;
            tx.put_holding(&holding)?;

            tx.append_transaction(NewTransaction {
                kind: TransactionKind::Purchase,
                card_id: card.id.clone(),
                quantity,
                unit_price: Some(unit_price),
                cost_basis: cost,
                from_user: None,
                to_user: Some(username.to_string()),
                created_at: Utc::now(),
            })
        })?;

        log::info!(
            "Purchase #{}: {} bought {} x {} @ {:.2}",
            transaction.id,
            username,
            quantity,
            transaction.card_id,
            unit_price
        );
        Ok(transaction)
    }

    /// Sell `quantity` copies out of `username`'s holding at `unit_price` each.
    ///
    /// The whole quantity must be available; there are no partial sales.
    pub fn sell(
        &self,
        username: &str,
        card_id: &CardId,
        quantity: i64,
        unit_price: f64,
    ) -> Result<SaleReceipt> {
        validate_quantity(quantity)?;
        validate_price(unit_price)?;
        let proceeds = total_price(quantity, unit_price)?;

        let receipt = self.store.atomically(|tx| {
            require_user(tx, username)?;
            require_card(tx, card_id)?;

            let mut holding = load_holding(tx, username, card_id)?;
            ensure_available(&holding, quantity)?;
            let cost_removed = holding.withdraw(quantity);
            tx.put_holding(&holding)?;

            let transaction = tx.append_transaction(NewTransaction {
                kind: TransactionKind::Sale,
                card_id: card_id.clone(),
                quantity,
                unit_price: Some(unit_price),
                cost_basis: cost_removed,
                from_user: Some(username.to_string()),
                to_user: None,
                created_at: Utc::now(),
            })?;

            Ok(SaleReceipt {
                transaction,
                proceeds,
                cost_removed,
                realized_gain: proceeds - cost_removed,
            })
        })?;

        log::info!(
            "Sale #{}: {} sold {} x {} @ {:.2} (gain {:.2})",
            receipt.transaction.id,
            username,
            quantity,
            card_id,
            unit_price,
            receipt.realized_gain
        );
        Ok(receipt)
    }

    /// Move `quantity` copies, and their share of cost basis, between users.
    ///
    /// `unit_price` records what the recipient paid per copy, if anything.
    /// It is kept on the transaction only: cost basis moves at the source's
    /// average cost either way, so a transfer never creates or destroys value.
    pub fn transfer(
        &self,
        from: &str,
        to: &str,
        card_id: &CardId,
        quantity: i64,
        unit_price: Option<f64>,
    ) -> Result<Transaction> {
        validate_quantity(quantity)?;
        if let Some(price) = unit_price {
            validate_price(price)?;
            total_price(quantity, price)?;
        }
        if from == to {
            return Err(LedgerError::Validation(format!(
                "cannot transfer from '{}' to itself",
                from
            )));
        }

        let transaction = self.store.atomically(|tx| {
            require_user(tx, from)?;
            require_user(tx, to)?;
            require_card(tx, card_id)?;

            let mut source = load_holding(tx, from, card_id)?;
            ensure_available(&source, quantity)?;
            let mut destination = load_holding(tx, to, card_id)?;

            let cost_moved = source.withdraw(quantity);
            destination.deposit(quantity, cost_moved)?;
            tx.put_holding(&source)?;
            tx.put_holding(&destination)?;

            tx.append_transaction(NewTransaction {
                kind: TransactionKind::Transfer,
                card_id: card_id.clone(),
                quantity,
                unit_price,
                cost_basis: cost_moved,
                from_user: Some(from.to_string()),
                to_user: Some(to.to_string()),
                created_at: Utc::now(),
            })
        })?;

        log::info!(
            "Transfer #{}: {} x {} from {} to {}{}",
            transaction.id,
            quantity,
            card_id,
            from,
            to,
            unit_price
                .map(|p| format!(" @ {:.2}", p))
                .unwrap_or_default()
        );
        Ok(transaction)
    }

    /// Merge an oracle observation into the card's price history.
    ///
    /// Only strictly newer observations are accepted, so replaying the same
    /// or an older observation is a no-op.
    pub fn reconcile_price(
        &self,
        card_id: &CardId,
        observation: Option<PriceObservation>,
    ) -> Result<Reconciliation> {
        let Some(observation) = observation else {
            return Ok(Reconciliation::NoObservation);
        };
        if !observation.is_well_formed() {
            return Err(LedgerError::Validation(format!(
                "malformed price observation {} for {}",
                observation.price, card_id
            )));
        }

        let outcome = self.store.atomically(|tx| {
            let mut card = require_card(tx, card_id)?;
            if !card.accept_observation(observation) {
                let current = card.last_price.unwrap_or(observation);
                return Ok(Reconciliation::Stale { current });
            }
            tx.put_card(&card)?;
            Ok(Reconciliation::Accepted(observation))
        })?;

        match outcome {
            Reconciliation::Accepted(obs) => log::info!(
                "Price for {} is now {:.2} (observed {})",
                card_id,
                obs.price,
                obs.observed_at
            ),
            Reconciliation::Stale { current } => log::debug!(
                "Ignoring stale price for {}: observed {} is not newer than {}",
                card_id,
                observation.observed_at,
                current.observed_at
            ),
            Reconciliation::NoObservation => {}
        }
        Ok(outcome)
    }
}

fn validate_quantity(quantity: i64) -> Result<()> {
    if quantity <= 0 {
        return Err(LedgerError::Validation(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

fn validate_price(unit_price: f64) -> Result<()> {
    if !unit_price.is_finite() || unit_price < 0.0 {
        return Err(LedgerError::Validation(format!(
            "unit price must be a non-negative number, got {}",
            unit_price
        )));
    }
    Ok(())
}

/// quantity * unit_price, refused when it does not fit in an f64
fn total_price(quantity: i64, unit_price: f64) -> Result<f64> {
    let total = quantity as f64 * unit_price;
    if !total.is_finite() {
        return Err(LedgerError::Validation(format!(
            "total price out of range: {} x {}",
            quantity, unit_price
        )));
    }
    Ok(total)
}

fn validate_card(card: &NewCard) -> Result<()> {
    if card.name.trim().is_empty() {
        return Err(LedgerError::validation("card name must not be empty"));
    }
    Ok(())
}

fn ensure_available(holding: &Holding, quantity: i64) -> Result<()> {
    if holding.quantity < quantity {
        return Err(LedgerError::InsufficientInventory {
            username: holding.username.clone(),
            card_id: holding.card_id.clone(),
            requested: quantity,
            available: holding.quantity,
        });
    }
    Ok(())
}

fn require_user(tx: &dyn LedgerTx, username: &str) -> Result<User> {
    tx.get_user(username)?
        .ok_or_else(|| LedgerError::UserNotFound(username.to_string()))
}

pub(crate) fn require_card(tx: &dyn LedgerTx, card_id: &CardId) -> Result<Card> {
    tx.get_card(card_id)?
        .ok_or_else(|| LedgerError::CardNotFound(card_id.clone()))
}

fn ensure_card(tx: &mut dyn LedgerTx, card: &NewCard) -> Result<Card> {
    let card_id = card.id();
    if let Some(existing) = tx.get_card(&card_id)? {
        return Ok(existing);
    }
    let created = Card::from_new(card, Utc::now());
    tx.put_card(&created)?;
    log::debug!("Created card {}", created);
    Ok(created)
}

fn load_holding(tx: &dyn LedgerTx, username: &str, card_id: &CardId) -> Result<Holding> {
    Ok(tx
        .get_holding(username, card_id)?
        .unwrap_or_else(|| Holding::empty(username, card_id)))
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

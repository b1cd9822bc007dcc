//! Read-only views over the ledger
//!
//! Everything here goes through [`LedgerStore::read`]; no business rules are
//! applied and nothing is written.

use crate::engine::require_card;
use crate::error::{LedgerError, Result};
use crate::model::{Card, CardId, Holding, Transaction, TransactionKind, User};
use crate::store::LedgerStore;

/// One non-empty holding with its card
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryLine {
    pub card: Card,
    pub holding: Holding,
}

impl InventoryLine {
    /// Quantity at the last-known price, if any
    pub fn market_value(&self) -> Option<f64> {
        self.card
            .last_price
            .map(|o| o.price * self.holding.quantity as f64)
    }

    pub fn unrealized_gain(&self) -> Option<f64> {
        self.market_value().map(|v| v - self.holding.cost_basis)
    }
}

/// A user's current inventory
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryReport {
    pub user: User,
    /// Sorted by card name, then set, then condition
    pub lines: Vec<InventoryLine>,
}

impl InventoryReport {
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.holding.quantity).sum()
    }

    pub fn total_cost_basis(&self) -> f64 {
        self.lines.iter().map(|l| l.holding.cost_basis).sum()
    }

    /// Market value of the lines that have a known price
    pub fn total_market_value(&self) -> f64 {
        self.lines.iter().filter_map(|l| l.market_value()).sum()
    }

    /// Lines without any price observation yet
    pub fn unpriced_lines(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.card.last_price.is_none())
            .count()
    }
}

/// Build `username`'s inventory. Zero-quantity holdings are left out.
pub fn inventory_report<S: LedgerStore>(store: &S, username: &str) -> Result<InventoryReport> {
    store.read(|tx| {
        let user = tx
            .get_user(username)?
            .ok_or_else(|| LedgerError::UserNotFound(username.to_string()))?;

        let mut lines = tx
            .holdings_for_user(username)?
            .into_iter()
            .filter(|h| !h.is_empty())
            .map(|holding| {
                let card = require_card(tx, &holding.card_id)?;
                Ok(InventoryLine { card, holding })
            })
            .collect::<Result<Vec<_>>>()?;

        lines.sort_by(|a, b| {
            (&a.card.name, &a.card.set_name, &a.card.condition).cmp(&(
                &b.card.name,
                &b.card.set_name,
                &b.card.condition,
            ))
        });

        Ok(InventoryReport { user, lines })
    })
}

/// Which part of the transaction log to show
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HistoryFilter {
    #[default]
    All,
    Card(CardId),
    /// Every printing of a card name, whatever its set or condition
    CardName(String),
    /// Transactions where the user is source or destination
    User(String),
}

impl HistoryFilter {
    fn matches(&self, transaction: &Transaction) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Card(card_id) => &transaction.card_id == card_id,
            HistoryFilter::CardName(name) => transaction.card_id.has_name(name),
            HistoryFilter::User(username) => transaction.involves(username),
        }
    }
}

/// Transactions matching `filter`, newest first.
///
/// An unknown card or user simply matches nothing; past entries of removed
/// users stay visible.
pub fn transaction_history<S: LedgerStore>(
    store: &S,
    filter: &HistoryFilter,
) -> Result<Vec<Transaction>> {
    let mut transactions: Vec<Transaction> = store
        .read(|tx| tx.transactions())?
        .into_iter()
        .filter(|t| filter.matches(t))
        .collect();
    // Ids follow append order
    transactions.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(transactions)
}

/// Realized gains over a user's sales
#[derive(Debug, Clone, PartialEq)]
pub struct GainsSummary {
    pub username: String,
    /// Oldest first
    pub sales: Vec<Transaction>,
    pub proceeds: f64,
    pub cost_removed: f64,
}

impl GainsSummary {
    pub fn realized_gain(&self) -> f64 {
        self.proceeds - self.cost_removed
    }

    pub fn units_sold(&self) -> i64 {
        self.sales.iter().map(|t| t.quantity).sum()
    }
}

/// Sum up every sale `username` made
pub fn realized_gains<S: LedgerStore>(store: &S, username: &str) -> Result<GainsSummary> {
    let sales: Vec<Transaction> = store
        .read(|tx| tx.transactions())?
        .into_iter()
        .filter(|t| t.kind == TransactionKind::Sale && t.from_user.as_deref() == Some(username))
        .collect();

    let proceeds = sales.iter().filter_map(Transaction::proceeds).sum();
    let cost_removed = sales.iter().map(|t| t.cost_basis).sum();

    Ok(GainsSummary {
        username: username.to_string(),
        sales,
        proceeds,
        cost_removed,
    })
}

//! Ledger entities: users, cards, holdings and the transaction log

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tcg_common::PriceObservation;

/// Stable card key derived from name, set and condition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id for a printing.
    ///
    /// Attributes are trimmed, whitespace-collapsed and lowercased so
    /// "Black Lotus" / " black  lotus" resolve to the same card.
    pub fn for_card(name: &str, set_name: &str, condition: &str) -> Self {
        Self(format!(
            "{}|{}|{}",
            normalize(name),
            normalize(set_name),
            normalize(condition)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized card name, the id minus its set and condition
    pub fn name(&self) -> &str {
        self.0.rsplitn(3, '|').last().unwrap_or_default()
    }

    /// Whether this id belongs to any printing of `name`
    pub fn has_name(&self, name: &str) -> bool {
        self.name() == normalize(name)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A registered user. The username is the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Card attributes as given by a caller, before the card exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCard {
    pub name: String,
    pub set_name: String,
    /// e.g. NM, LP, MP
    pub condition: String,
}

impl NewCard {
    pub fn new(
        name: impl Into<String>,
        set_name: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            set_name: set_name.into(),
            condition: condition.into(),
        }
    }

    pub fn id(&self) -> CardId {
        CardId::for_card(&self.name, &self.set_name, &self.condition)
    }
}

/// A card printing plus everything known about its market price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub set_name: String,
    pub condition: String,
    /// Newest accepted observation
    pub last_price: Option<PriceObservation>,
    /// Accepted observations, oldest first
    pub price_history: Vec<PriceObservation>,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn from_new(card: &NewCard, created_at: DateTime<Utc>) -> Self {
        Self {
            id: card.id(),
            name: card.name.trim().to_string(),
            set_name: card.set_name.trim().to_string(),
            condition: card.condition.trim().to_string(),
            last_price: None,
            price_history: Vec::new(),
            created_at,
        }
    }

    /// Query string handed to price oracles
    pub fn query(&self) -> String {
        format!("{} {}", self.name, self.set_name).trim().to_string()
    }

    /// Merge an observation if it is strictly newer than the current one.
    ///
    /// Returns false (and changes nothing) for stale or replayed observations.
    pub fn accept_observation(&mut self, observation: PriceObservation) -> bool {
        if !observation.supersedes(self.last_price.as_ref()) {
            return false;
        }
        self.price_history.push(observation);
        self.last_price = Some(observation);
        true
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}, {}]", self.name, self.set_name, self.condition)
    }
}

/// How many copies of a card a user owns, and what they cost in total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub username: String,
    pub card_id: CardId,
    pub quantity: i64,
    pub cost_basis: f64,
}

impl Holding {
    pub fn empty(username: &str, card_id: &CardId) -> Self {
        Self {
            username: username.to_string(),
            card_id: card_id.clone(),
            quantity: 0,
            cost_basis: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    pub fn average_cost(&self) -> Option<f64> {
        (self.quantity > 0).then(|| self.cost_basis / self.quantity as f64)
    }

    /// Cost basis attributable to `quantity` units under average-cost accounting
    pub fn cost_of(&self, quantity: i64) -> f64 {
        if quantity >= self.quantity {
            self.cost_basis
        } else {
            self.cost_basis * quantity as f64 / self.quantity as f64
        }
    }

    /// Add `quantity` units costing `cost` in total.
    ///
    /// Refuses (and changes nothing) if the quantity would overflow or the
    /// cost basis would stop being a finite number.
    pub(crate) fn deposit(&mut self, quantity: i64, cost: f64) -> Result<()> {
        let total = self.quantity.checked_add(quantity).ok_or_else(|| {
            LedgerError::Validation(format!(
                "quantity overflow: {} holds {} of {}, adding {}",
                self.username, self.quantity, self.card_id, quantity
            ))
        })?;
        let cost_basis = self.cost_basis + cost;
        if !cost_basis.is_finite() {
            return Err(LedgerError::Validation(format!(
                "cost basis out of range for {} of {}",
                self.username, self.card_id
            )));
        }
        self.quantity = total;
        self.cost_basis = cost_basis;
        Ok(())
    }

    /// Remove `quantity` units and their share of the cost basis.
    ///
    /// Caller has checked `quantity <= self.quantity`. Returns the cost removed.
    pub(crate) fn withdraw(&mut self, quantity: i64) -> f64 {
        let cost = self.cost_of(quantity);
        self.quantity -= quantity;
        if self.quantity == 0 {
            self.cost_basis = 0.0;
        } else {
            self.cost_basis -= cost;
        }
        cost
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Purchase,
    Sale,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Purchase => "PURCHASE",
            TransactionKind::Sale => "SALE",
            TransactionKind::Transfer => "TRANSFER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PURCHASE" => Some(TransactionKind::Purchase),
            "SALE" => Some(TransactionKind::Sale),
            "TRANSFER" => Some(TransactionKind::Transfer),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction waiting to be appended; the store assigns the id
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub card_id: CardId,
    pub quantity: i64,
    /// None for transfers
    pub unit_price: Option<f64>,
    /// Cost basis added (purchase), removed (sale) or moved (transfer)
    pub cost_basis: f64,
    /// None for purchases
    pub from_user: Option<String>,
    /// None for sales
    pub to_user: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub kind: TransactionKind,
    pub card_id: CardId,
    pub quantity: i64,
    pub unit_price: Option<f64>,
    pub cost_basis: f64,
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn from_new(id: i64, new: NewTransaction) -> Self {
        Self {
            id,
            kind: new.kind,
            card_id: new.card_id,
            quantity: new.quantity,
            unit_price: new.unit_price,
            cost_basis: new.cost_basis,
            from_user: new.from_user,
            to_user: new.to_user,
            created_at: new.created_at,
        }
    }

    /// Sale proceeds; None for anything but a sale
    pub fn proceeds(&self) -> Option<f64> {
        match (self.kind, self.unit_price) {
            (TransactionKind::Sale, Some(price)) => Some(price * self.quantity as f64),
            _ => None,
        }
    }

    /// Proceeds minus cost basis removed; None for anything but a sale
    pub fn realized_gain(&self) -> Option<f64> {
        self.proceeds().map(|p| p - self.cost_basis)
    }

    pub fn involves(&self, username: &str) -> bool {
        self.from_user.as_deref() == Some(username) || self.to_user.as_deref() == Some(username)
    }
}

//! Ledger storage contract and its adapters
//!
//! The inventory engine only ever talks to a [`LedgerStore`]. Every logical
//! operation runs inside [`LedgerStore::atomically`]: the closure sees a
//! [`LedgerTx`] and either all of its writes land or none do.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{init_schema, SqliteStore};

use crate::error::Result;
use crate::model::{Card, CardId, Holding, NewTransaction, Transaction, User};

/// Keyed reads and writes available inside one atomic unit
pub trait LedgerTx {
    fn get_user(&self, username: &str) -> Result<Option<User>>;
    fn put_user(&mut self, user: &User) -> Result<()>;
    fn delete_user(&mut self, username: &str) -> Result<()>;

    fn get_card(&self, card_id: &CardId) -> Result<Option<Card>>;
    /// Insert or replace a card. Price history is append-only, so stores may
    /// persist only entries they have not seen yet.
    fn put_card(&mut self, card: &Card) -> Result<()>;

    fn get_holding(&self, username: &str, card_id: &CardId) -> Result<Option<Holding>>;
    fn put_holding(&mut self, holding: &Holding) -> Result<()>;

    /// Append to the audit log; the store assigns a strictly increasing id
    fn append_transaction(&mut self, transaction: NewTransaction) -> Result<Transaction>;

    fn holdings_for_user(&self, username: &str) -> Result<Vec<Holding>>;
    fn holdings_for_card(&self, card_id: &CardId) -> Result<Vec<Holding>>;
    /// Whole log, oldest first
    fn transactions(&self) -> Result<Vec<Transaction>>;
}

/// Durable home of the ledger
pub trait LedgerStore: Send + Sync {
    /// Run `op` as one serializable, all-or-nothing unit.
    ///
    /// If `op` returns `Err`, nothing it wrote is kept.
    fn atomically<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T>;

    /// Run a read-only closure against a consistent view
    fn read<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&dyn LedgerTx) -> Result<T>,
    {
        self.atomically(|tx| op(&*tx))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

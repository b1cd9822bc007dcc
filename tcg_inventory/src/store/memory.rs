//! In-memory ledger store
//!
//! Each atomic unit works on a copy of the state; the copy replaces the live
//! state only when the unit succeeds. The mutex is held for the whole unit,
//! which serializes writers.

use super::{LedgerStore, LedgerTx};
use crate::error::{LedgerError, Result};
use crate::model::{Card, CardId, Holding, NewTransaction, Transaction, User};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    users: BTreeMap<String, User>,
    cards: BTreeMap<CardId, Card>,
    holdings: BTreeMap<(String, CardId), Holding>,
    log: Vec<Transaction>,
}

/// Ledger store backed by process memory (tests, dry runs)
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<LedgerState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn atomically<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T>,
    {
        let mut live = self
            .state
            .lock()
            .map_err(|_| LedgerError::Store("memory store lock poisoned".to_string()))?;

        let mut scratch = live.clone();
        let value = op(&mut scratch)?;
        *live = scratch;
        Ok(value)
    }
}

impl LedgerTx for LedgerState {
    fn get_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users.get(username).cloned())
    }

    fn put_user(&mut self, user: &User) -> Result<()> {
        self.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    fn delete_user(&mut self, username: &str) -> Result<()> {
        self.users.remove(username);
        self.holdings.retain(|(owner, _), _| owner != username);
        Ok(())
    }

    fn get_card(&self, card_id: &CardId) -> Result<Option<Card>> {
        Ok(self.cards.get(card_id).cloned())
    }

    fn put_card(&mut self, card: &Card) -> Result<()> {
        self.cards.insert(card.id.clone(), card.clone());
        Ok(())
    }

    fn get_holding(&self, username: &str, card_id: &CardId) -> Result<Option<Holding>> {
        Ok(self
            .holdings
            .get(&(username.to_string(), card_id.clone()))
            .cloned())
    }

    fn put_holding(&mut self, holding: &Holding) -> Result<()> {
        self.holdings.insert(
            (holding.username.clone(), holding.card_id.clone()),
            holding.clone(),
        );
        Ok(())
    }

    fn append_transaction(&mut self, transaction: NewTransaction) -> Result<Transaction> {
        let id = self.log.last().map_or(1, |t| t.id + 1);
        let transaction = Transaction::from_new(id, transaction);
        self.log.push(transaction.clone());
        Ok(transaction)
    }

    fn holdings_for_user(&self, username: &str) -> Result<Vec<Holding>> {
        Ok(self
            .holdings
            .values()
            .filter(|h| h.username == username)
            .cloned()
            .collect())
    }

    fn holdings_for_card(&self, card_id: &CardId) -> Result<Vec<Holding>> {
        Ok(self
            .holdings
            .values()
            .filter(|h| &h.card_id == card_id)
            .cloned()
            .collect())
    }

    fn transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.log.clone())
    }
}

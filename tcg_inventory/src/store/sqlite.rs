//! SQLite ledger store
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Each atomic unit is a `BEGIN IMMEDIATE` transaction, so two writers never
//! interleave their read-modify-write cycles.

use super::{LedgerStore, LedgerTx};
use crate::error::{LedgerError, Result};
use crate::model::{Card, CardId, Holding, NewTransaction, Transaction, TransactionKind, User};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use tcg_common::PriceObservation;

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `users`: registered users keyed by username
/// - `cards`: card printings with their last-known price
/// - `price_observations`: accepted price history per card
/// - `holdings`: quantity and cost basis per (user, card)
/// - `transactions`: append-only audit log
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cards (
            card_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            set_name TEXT NOT NULL,
            condition TEXT NOT NULL,
            last_price REAL,
            last_observed_at TEXT,
            created_at TEXT NOT NULL
        );

        -- One row per accepted observation; rowid order is observation order
        CREATE TABLE IF NOT EXISTS price_observations (
            card_id TEXT NOT NULL,
            observed_at TEXT NOT NULL,
            price REAL NOT NULL,
            PRIMARY KEY (card_id, observed_at),
            FOREIGN KEY (card_id) REFERENCES cards(card_id)
        );

        CREATE TABLE IF NOT EXISTS holdings (
            username TEXT NOT NULL,
            card_id TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            cost_basis REAL NOT NULL,
            PRIMARY KEY (username, card_id),
            FOREIGN KEY (card_id) REFERENCES cards(card_id)
        );

        CREATE INDEX IF NOT EXISTS idx_holdings_card ON holdings(card_id);

        -- Audit log: rows are only ever inserted
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK (kind IN ('PURCHASE', 'SALE', 'TRANSFER')),
            card_id TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            unit_price REAL,
            cost_basis REAL NOT NULL,
            from_user TEXT,
            to_user TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_card ON transactions(card_id);
        ",
    )?;

    log::debug!("Ledger schema initialized");
    Ok(())
}

/// Ledger store backed by a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and initialise the schema
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        log::info!("Opened ledger database: {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl LedgerStore for SqliteStore {
    fn atomically<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| LedgerError::Store("database connection lock poisoned".to_string()))?;

        // Dropping `tx` without commit rolls back
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&mut SqliteTx { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl ToSql for CardId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CardId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(CardId::new)
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        TransactionKind::parse(text).ok_or_else(|| {
            FromSqlError::Other(format!("unknown transaction kind: {}", text).into())
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn holding_from_row(row: &Row<'_>) -> rusqlite::Result<Holding> {
    Ok(Holding {
        username: row.get(0)?,
        card_id: row.get(1)?,
        quantity: row.get(2)?,
        cost_basis: row.get(3)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        kind: row.get(1)?,
        card_id: row.get(2)?,
        quantity: row.get(3)?,
        unit_price: row.get(4)?,
        cost_basis: row.get(5)?,
        from_user: row.get(6)?,
        to_user: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl SqliteTx<'_> {
    fn price_history(&self, card_id: &CardId) -> rusqlite::Result<Vec<PriceObservation>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT price, observed_at FROM price_observations
             WHERE card_id = ?1
             ORDER BY rowid ASC",
        )?;
        let history = stmt
            .query_map(params![card_id], |row| {
                Ok(PriceObservation::new(row.get(0)?, row.get(1)?))
            })?
            .collect();
        history
    }
}

impl LedgerTx for SqliteTx<'_> {
    fn get_user(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT username, display_name, email, created_at
                 FROM users WHERE username = ?1",
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn put_user(&mut self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO users (username, display_name, email, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user.username, user.display_name, user.email, user.created_at],
        )?;
        Ok(())
    }

    fn delete_user(&mut self, username: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM holdings WHERE username = ?1", params![username])?;
        self.conn
            .execute("DELETE FROM users WHERE username = ?1", params![username])?;
        Ok(())
    }

    fn get_card(&self, card_id: &CardId) -> Result<Option<Card>> {
        let row = self
            .conn
            .query_row(
                "SELECT name, set_name, condition, last_price, last_observed_at, created_at
                 FROM cards WHERE card_id = ?1",
                params![card_id],
                |row| {
                    let last_price: Option<f64> = row.get(3)?;
                    let last_observed_at: Option<DateTime<Utc>> = row.get(4)?;
                    Ok(Card {
                        id: card_id.clone(),
                        name: row.get(0)?,
                        set_name: row.get(1)?,
                        condition: row.get(2)?,
                        last_price: last_price
                            .zip(last_observed_at)
                            .map(|(price, at)| PriceObservation::new(price, at)),
                        price_history: Vec::new(),
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        match row {
            Some(mut card) => {
                card.price_history = self.price_history(card_id)?;
                Ok(Some(card))
            }
            None => Ok(None),
        }
    }

    fn put_card(&mut self, card: &Card) -> Result<()> {
        self.conn.execute(
            "INSERT INTO cards
             (card_id, name, set_name, condition, last_price, last_observed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(card_id) DO UPDATE SET
                 name             = excluded.name,
                 set_name         = excluded.set_name,
                 condition        = excluded.condition,
                 last_price       = excluded.last_price,
                 last_observed_at = excluded.last_observed_at",
            params![
                card.id,
                card.name,
                card.set_name,
                card.condition,
                card.last_price.map(|o| o.price),
                card.last_price.map(|o| o.observed_at),
                card.created_at,
            ],
        )?;

        // History is append-only: rows already stored are left alone
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO price_observations (card_id, observed_at, price)
             VALUES (?1, ?2, ?3)",
        )?;
        for observation in &card.price_history {
            stmt.execute(params![card.id, observation.observed_at, observation.price])?;
        }
        Ok(())
    }

    fn get_holding(&self, username: &str, card_id: &CardId) -> Result<Option<Holding>> {
        let holding = self
            .conn
            .query_row(
                "SELECT username, card_id, quantity, cost_basis
                 FROM holdings WHERE username = ?1 AND card_id = ?2",
                params![username, card_id],
                holding_from_row,
            )
            .optional()?;
        Ok(holding)
    }

    fn put_holding(&mut self, holding: &Holding) -> Result<()> {
        self.conn.execute(
            "INSERT INTO holdings (username, card_id, quantity, cost_basis)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(username, card_id) DO UPDATE SET
                 quantity   = excluded.quantity,
                 cost_basis = excluded.cost_basis",
            params![
                holding.username,
                holding.card_id,
                holding.quantity,
                holding.cost_basis
            ],
        )?;
        Ok(())
    }

    fn append_transaction(&mut self, transaction: NewTransaction) -> Result<Transaction> {
        self.conn.execute(
            "INSERT INTO transactions
             (kind, card_id, quantity, unit_price, cost_basis, from_user, to_user, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                transaction.kind,
                transaction.card_id,
                transaction.quantity,
                transaction.unit_price,
                transaction.cost_basis,
                transaction.from_user,
                transaction.to_user,
                transaction.created_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Transaction::from_new(id, transaction))
    }

    fn holdings_for_user(&self, username: &str) -> Result<Vec<Holding>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT username, card_id, quantity, cost_basis
             FROM holdings WHERE username = ?1
             ORDER BY card_id",
        )?;
        let holdings = stmt
            .query_map(params![username], holding_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(holdings)
    }

    fn holdings_for_card(&self, card_id: &CardId) -> Result<Vec<Holding>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT username, card_id, quantity, cost_basis
             FROM holdings WHERE card_id = ?1
             ORDER BY username",
        )?;
        let holdings = stmt
            .query_map(params![card_id], holding_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(holdings)
    }

    fn transactions(&self) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, kind, card_id, quantity, unit_price, cost_basis, from_user, to_user, created_at
             FROM transactions
             ORDER BY id ASC",
        )?;
        let log = stmt
            .query_map([], transaction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(log)
    }
}

//! TCG Inventory - card ownership ledger
//!
//! Records purchases, sales and transfers of trading cards between users,
//! keeps average-cost basis per holding, and enriches cards with last-sold
//! prices from a pluggable, best-effort price oracle.

pub mod engine;
pub mod error;
pub mod formatters;
pub mod http_oracle;
pub mod model;
pub mod pricing;
pub mod report;
pub mod store;

pub use engine::{Inventory, Reconciliation, SaleReceipt, DEFAULT_ORACLE_TIMEOUT};
pub use error::{LedgerError, Result};
pub use http_oracle::HttpPriceOracle;
pub use model::{Card, CardId, Holding, NewCard, Transaction, TransactionKind, User};
pub use pricing::{OracleUnavailable, PriceRefresh};
pub use report::{
    inventory_report, realized_gains, transaction_history, GainsSummary, HistoryFilter,
    InventoryLine, InventoryReport,
};
pub use store::{LedgerStore, LedgerTx, MemoryStore, SqliteStore};

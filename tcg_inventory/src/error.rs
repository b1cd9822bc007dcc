//! Error types for tcg_inventory

use crate::model::CardId;

/// Why a ledger operation was refused or could not run.
///
/// Every variant means the ledger is unchanged: operations are all-or-nothing.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or out-of-range input; the operation was not attempted
    #[error("Invalid input: {0}")]
    Validation(String),
    /// Referenced user does not exist
    #[error("User not found: {0}")]
    UserNotFound(String),
    /// Referenced card does not exist
    #[error("Card not found: {0}")]
    CardNotFound(CardId),
    /// Holding is smaller than the requested quantity
    #[error("Insufficient inventory: {username} holds {available} of {card_id}, {requested} requested")]
    InsufficientInventory {
        username: String,
        card_id: CardId,
        requested: i64,
        available: i64,
    },
    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Store could not be used at all (e.g. a poisoned lock)
    #[error("Store unavailable: {0}")]
    Store(String),
}

impl LedgerError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    /// True for both unknown users and unknown cards
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::UserNotFound(_) | LedgerError::CardNotFound(_)
        )
    }
}

/// Result alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

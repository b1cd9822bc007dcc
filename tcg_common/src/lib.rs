//! Shared types for TCG inventory tooling
//!
//! Defines the contract between the inventory ledger and whatever external
//! price source is plugged into it.

pub mod error;
pub mod observation;
pub mod oracle;

pub use error::OracleError;
pub use observation::PriceObservation;
pub use oracle::{lookup, PriceOracle};

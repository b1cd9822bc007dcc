//! Error types for price lookups

use std::time::Duration;

/// Why a price lookup produced no usable observation
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// HTTP request failed (network error, connection refused, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Price source answered with a non-success status
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),
    /// Response body was not valid JSON for the expected shape
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Response parsed but carried an unusable observation
    #[error("Malformed price observation: {0}")]
    Malformed(String),
    /// Price source did not answer within the allotted time
    #[error("Price lookup timed out after {0:?}")]
    Timeout(Duration),
}

//! Price oracle contract
//!
//! An oracle answers "what did this card last sell for?" for a free-form
//! query string. Answers are best-effort: a source may know nothing, fail,
//! or hang, and callers bound every lookup with a timeout.

use crate::error::OracleError;
use crate::observation::PriceObservation;
use std::future::Future;
use std::time::Duration;

/// External source of last-sold prices
pub trait PriceOracle: Send + Sync {
    /// Fetch the most recent observation for `query`.
    ///
    /// `Ok(None)` means the source answered but found nothing.
    fn fetch(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Option<PriceObservation>, OracleError>> + Send;
}

/// No configured source: every lookup finds nothing
impl<O: PriceOracle> PriceOracle for Option<O> {
    async fn fetch(&self, query: &str) -> Result<Option<PriceObservation>, OracleError> {
        match self {
            Some(oracle) => oracle.fetch(query).await,
            None => {
                log::debug!("No price oracle configured, skipping lookup for '{}'", query);
                Ok(None)
            }
        }
    }
}

/// Look up `query` on `oracle`, giving up after `timeout`.
///
/// Observations with a negative or non-finite price are reported as
/// [`OracleError::Malformed`] instead of being handed to the caller.
pub async fn lookup<O: PriceOracle>(
    oracle: &O,
    query: &str,
    timeout: Duration,
) -> Result<Option<PriceObservation>, OracleError> {
    log::debug!("Looking up price for '{}' (timeout {:?})", query, timeout);

    match tokio::time::timeout(timeout, oracle.fetch(query)).await {
        Ok(Ok(Some(observation))) if !observation.is_well_formed() => Err(
            OracleError::Malformed(format!("price {} for '{}'", observation.price, query)),
        ),
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout(timeout)),
    }
}

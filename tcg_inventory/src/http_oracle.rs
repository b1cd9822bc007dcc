//! HTTP price oracle
//!
//! Asks a last-sold price service over plain JSON:
//!
//! ```text
//! GET <base_url>?q=<query>
//! 200 {"price": 12.5, "observed_at": "2024-05-01T12:00:00Z"}
//! 200 {"price": null}        no sold listing found
//! 404                        no sold listing found
//! ```
//!
//! Uses async reqwest for non-blocking HTTP requests. Timeouts are applied
//! by the caller through [`tcg_common::lookup`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tcg_common::{OracleError, PriceObservation, PriceOracle};

const USER_AGENT: &str = "tcg_inventory/1.0";

/// Body returned by the price service
#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    observed_at: Option<DateTime<Utc>>,
}

/// [`PriceOracle`] backed by an HTTP price service
#[derive(Debug, Clone)]
pub struct HttpPriceOracle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceOracle {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, query: &str) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}q={}",
            self.base_url,
            separator,
            urlencoding::encode(query)
        )
    }
}

impl PriceOracle for HttpPriceOracle {
    async fn fetch(&self, query: &str) -> Result<Option<PriceObservation>, OracleError> {
        let url = self.url_for(query);
        log::debug!("Fetching last sold price: {}", url);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            log::debug!("Price service has no listing for '{}'", query);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(OracleError::HttpStatus(status));
        }

        let body = response.text().await?;
        let parsed: PriceResponse = serde_json::from_str(&body)?;

        match (parsed.price, parsed.observed_at) {
            (None, _) => Ok(None),
            (Some(price), Some(observed_at)) => Ok(Some(PriceObservation::new(price, observed_at))),
            (Some(price), None) => Err(OracleError::Malformed(format!(
                "price {} for '{}' has no observation time",
                price, query
            ))),
        }
    }
}

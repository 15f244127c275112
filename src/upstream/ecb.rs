//! ECB daily reference rates, read through the Frankfurter JSON API.
//!
//! See: <https://www.frankfurter.app/docs/>

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{DEFAULT_TIMEOUT, RatesSource, handle_response_errors, http_client, trim_base_url};
use crate::types::{Rates, now_millis};
use crate::{PriceGateError, Result};

/// Default base URL for the Frankfurter API.
pub const DEFAULT_BASE_URL: &str = "https://api.frankfurter.app";

const PROVIDER: &str = "ecb";

/// Client for ECB reference rates (EUR base).
#[derive(Clone)]
pub struct EcbClient {
    http: Client,
    base_url: String,
}

impl EcbClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: trim_base_url(base_url),
        })
    }
}

#[async_trait]
impl RatesSource for EcbClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn latest_rates(&self) -> Result<Rates> {
        let response = self
            .http
            .get(format!("{}/latest", self.base_url))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| PriceGateError::Http(e.to_string()))?;

        handle_response_errors(&response, PROVIDER)?;

        let body: LatestRates = response
            .json()
            .await
            .map_err(|e| PriceGateError::Decode(format!("{PROVIDER} /latest: {e}")))?;

        if body.rates.is_empty() {
            return Err(PriceGateError::Decode(format!("{PROVIDER} returned no rates")));
        }

        Ok(Rates {
            base: body.base.to_uppercase(),
            rates: body.rates,
            timestamp: now_millis(),
            cached: false,
        })
    }
}

#[derive(Deserialize)]
struct LatestRates {
    base: String,
    rates: BTreeMap<String, f64>,
}

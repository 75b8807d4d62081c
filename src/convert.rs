//! Currency conversion into the configured base currency.
//!
//! Rates come from exchangerate-api.com: one request per conversion against
//! `/latest/{currency}`, taking the quoted rate for the base currency. With
//! no API key the service refuses to start unless `bypass_on_missing_key`
//! is set, in which case amounts pass through unconverted.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::config::CurrencyConfig;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no currency API key configured; set currency.api_key or currency.bypass_on_missing_key")]
    MissingApiKey,
    #[error("currency API request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("currency API returned no {base} rate for {currency}")]
    MissingRate { currency: String, base: String },
    #[error("currency API returned an unusable rate for {0}")]
    BadRate(String),
}

enum Mode {
    /// `{endpoint}/{api_key}/latest` with the source currency appended.
    Live { latest_url: String },
    /// No conversion: every amount is taken as already being in the base
    /// currency.
    Bypass,
}

pub struct CurrencyConverter {
    base: String,
    mode: Mode,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RatesResponse {
    #[serde(default)]
    conversion_rates: HashMap<String, f64>,
}

impl CurrencyConverter {
    pub fn from_config(config: &CurrencyConfig) -> Result<Self, ConvertError> {
        let mode = match &config.api_key {
            Some(key) if !key.is_empty() => Mode::Live {
                latest_url: format!("{}/{}/latest", config.endpoint.trim_end_matches('/'), key),
            },
            _ if config.bypass_on_missing_key => {
                tracing::warn!("No currency API key; conversion disabled, amounts pass through");
                Mode::Bypass
            }
            _ => return Err(ConvertError::MissingApiKey),
        };
        Ok(Self {
            base: config.base_currency.clone(),
            mode,
            client: reqwest::Client::new(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Converts `amount` of `currency` into the base currency. Amounts
    /// already in the base currency never hit the network.
    pub async fn to_base(&self, amount: Decimal, currency: &str) -> Result<Decimal, ConvertError> {
        if currency == self.base {
            return Ok(amount);
        }
        let latest_url = match &self.mode {
            Mode::Live { latest_url } => latest_url,
            Mode::Bypass => {
                tracing::warn!(currency, "Conversion bypassed, storing amount unconverted");
                return Ok(amount);
            }
        };

        let response: RatesResponse = self
            .client
            .get(format!("{}/{}", latest_url, currency))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let rate = response
            .conversion_rates
            .get(&self.base)
            .copied()
            .ok_or_else(|| ConvertError::MissingRate {
                currency: currency.to_string(),
                base: self.base.clone(),
            })?;
        let rate = Decimal::from_f64_retain(rate)
            .filter(|r| !r.is_zero() && r.is_sign_positive())
            .ok_or_else(|| ConvertError::BadRate(currency.to_string()))?;

        Ok(amount * rate)
    }
}

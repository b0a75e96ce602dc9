//! USD to INR quote providers.

use std::sync::Arc;

use reqwest::Url;
use serde_json::Value;

use costbot_core::config::{RateConfig, RateProvider, Secret};
use costbot_core::report::{QuoteError, RateQuoter};

use crate::http::{HttpRequest, HttpTransport, send_logged, snippet};

pub const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";
pub const EXCHANGE_RATE_API_URL: &str = "https://v6.exchangerate-api.com/v6";

/// Build the configured quoter, or `None` when no key is set.
pub fn quoter_from_config(
    transport: Arc<dyn HttpTransport>,
    rate: &RateConfig,
) -> Option<Box<dyn RateQuoter>> {
    let key = rate.api_key.clone()?;
    Some(match rate.provider {
        RateProvider::AlphaVantage => Box::new(AlphaVantageQuoter::new(transport, key)),
        RateProvider::ExchangeRateApi => Box::new(ExchangeRateApiQuoter::new(transport, key)),
    })
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn get_json(transport: &dyn HttpTransport, url: Url) -> Result<Value, QuoteError> {
    let response = send_logged(transport, &HttpRequest::get(url.as_str()), "rate")
        .map_err(|e| QuoteError(e.to_string()))?;
    if !response.is_success() {
        return Err(QuoteError(format!(
            "status={} body={}",
            response.status,
            snippet(&response.body)
        )));
    }
    serde_json::from_str(&response.body).map_err(|e| QuoteError(format!("malformed quote: {}", e)))
}

/// `["Realtime Currency Exchange Rate"]["5. Exchange Rate"]`, a string or number.
pub fn parse_alpha_vantage(body: &Value) -> Result<f64, QuoteError> {
    if let Some(rate) = body
        .get("Realtime Currency Exchange Rate")
        .and_then(|block| block.get("5. Exchange Rate"))
    {
        return number(rate).ok_or_else(|| QuoteError(format!("non-numeric rate {}", rate)));
    }
    for notice in ["Error Message", "Note", "Information"] {
        if let Some(text) = body.get(notice).and_then(|v| v.as_str()) {
            return Err(QuoteError(format!("{}: {}", notice, text)));
        }
    }
    Err(QuoteError("response missing exchange rate field".into()))
}

/// `["conversion_rates"]["INR"]`; `result == "error"` carries `error-type`.
pub fn parse_exchange_rate_api(body: &Value) -> Result<f64, QuoteError> {
    if body.get("result").and_then(|v| v.as_str()) == Some("error") {
        let kind = body
            .get("error-type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        return Err(QuoteError(format!("provider error: {}", kind)));
    }
    let rate = body
        .get("conversion_rates")
        .and_then(|rates| rates.get("INR"))
        .ok_or_else(|| QuoteError("response missing conversion_rates.INR".into()))?;
    number(rate).ok_or_else(|| QuoteError(format!("non-numeric rate {}", rate)))
}

pub struct AlphaVantageQuoter {
    transport: Arc<dyn HttpTransport>,
    api_key: Secret,
    base_url: String,
}

impl AlphaVantageQuoter {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: Secret) -> Self {
        Self {
            transport,
            api_key,
            base_url: ALPHA_VANTAGE_URL.to_string(),
        }
    }
}

impl RateQuoter for AlphaVantageQuoter {
    fn quote_usd_to_inr(&self) -> Result<f64, QuoteError> {
        let url = Url::parse_with_params(
            &self.base_url,
            [
                ("function", "CURRENCY_EXCHANGE_RATE"),
                ("from_currency", "USD"),
                ("to_currency", "INR"),
                ("apikey", self.api_key.expose()),
            ],
        )
        .map_err(|e| QuoteError(format!("invalid quote url: {}", e)))?;
        parse_alpha_vantage(&get_json(self.transport.as_ref(), url)?)
    }

    fn provider(&self) -> &str {
        "alpha_vantage"
    }
}

pub struct ExchangeRateApiQuoter {
    transport: Arc<dyn HttpTransport>,
    api_key: Secret,
    base_url: String,
}

impl ExchangeRateApiQuoter {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: Secret) -> Self {
        Self {
            transport,
            api_key,
            base_url: EXCHANGE_RATE_API_URL.to_string(),
        }
    }
}

impl RateQuoter for ExchangeRateApiQuoter {
    fn quote_usd_to_inr(&self) -> Result<f64, QuoteError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| QuoteError(format!("invalid quote url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|()| QuoteError(format!("quote url cannot take a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend([self.api_key.expose(), "latest", "USD"]);
        parse_exchange_rate_api(&get_json(self.transport.as_ref(), url)?)
    }

    fn provider(&self) -> &str {
        "exchangerate_api"
    }
}

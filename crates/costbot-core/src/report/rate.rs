//! Exchange rate resolution with a fixed fallback. Never fails.

use tracing::{info, warn};

use super::ExchangeRate;

/// Error from a rate-quote provider.
#[derive(Debug, Clone)]
pub struct QuoteError(pub String);

impl std::fmt::Display for QuoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for QuoteError {}

/// Rate-quote provider abstraction: one request, one USD to INR number.
pub trait RateQuoter: Send + Sync {
    fn quote_usd_to_inr(&self) -> Result<f64, QuoteError>;

    fn provider(&self) -> &str {
        "rate_quoter"
    }
}

pub struct RateResolver<'a> {
    quoter: Option<&'a dyn RateQuoter>,
}

impl<'a> RateResolver<'a> {
    /// `None` means no provider is configured; [`resolve`](Self::resolve) then returns the
    /// fallback.
    pub fn new(quoter: Option<&'a dyn RateQuoter>) -> Self {
        Self { quoter }
    }

    pub fn resolve(&self) -> ExchangeRate {
        let Some(quoter) = self.quoter else {
            warn!(
                event = "rate.fallback_used",
                domain = "rate",
                reason = "no provider configured",
                rate = ExchangeRate::fallback().usd_to_inr
            );
            return ExchangeRate::fallback();
        };
        match quoter.quote_usd_to_inr() {
            Ok(rate) if rate.is_finite() && rate > 0.0 => {
                info!(
                    event = "rate.resolved",
                    domain = "rate",
                    provider = quoter.provider(),
                    rate = rate
                );
                ExchangeRate::live(rate)
            }
            Ok(rate) => {
                warn!(
                    event = "rate.fallback_used",
                    domain = "rate",
                    provider = quoter.provider(),
                    reason = "implausible quote",
                    quoted = rate
                );
                ExchangeRate::fallback()
            }
            Err(err) => {
                warn!(
                    event = "rate.fallback_used",
                    domain = "rate",
                    provider = quoter.provider(),
                    reason = "quote failed",
                    error = %err
                );
                ExchangeRate::fallback()
            }
        }
    }
}

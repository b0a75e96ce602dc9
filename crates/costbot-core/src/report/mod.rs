//! Spend report model: the records, the aggregated report, and the conversion rate.
//!
//! ```text
//!   CostSource --> CostAggregator --\
//!                                    +--> format_report --> text
//!   RateQuoter --> RateResolver ----/
//! ```

mod aggregate;
mod format;
mod rate;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

pub use aggregate::{CostAggregator, CostBucket, CostQuery, CostSource, CostSourceError, reduce};
pub use format::{NO_SPEND_SENTINEL, format_report, group_thousands, money};
pub use rate::{QuoteError, RateQuoter, RateResolver};

/// Last-good USD to INR rate, used whenever the live quote cannot be obtained.
pub const FALLBACK_USD_TO_INR: f64 = 83.34;

/// Spend attributed to one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendRecord {
    pub category: String,
    pub amount: f64,
}

impl SpendRecord {
    pub fn new(category: impl Into<String>, amount: f64) -> Self {
        Self {
            category: category.into(),
            amount,
        }
    }
}

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SpendWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `days` days before `today`, excluding `today` itself (its data is still incomplete).
    /// `None` when the start would fall outside the representable calendar.
    pub fn trailing(today: NaiveDate, days: u32) -> Option<Self> {
        let start = today.checked_sub_signed(TimeDelta::days(i64::from(days)))?;
        Some(Self { start, end: today })
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }
}

/// Per-category totals over a window, largest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_usd: f64,
    pub by_category: Vec<SpendRecord>,
}

impl AggregateReport {
    /// Builds the report from already-reduced records; the total is their sum.
    pub fn from_records(window: SpendWindow, by_category: Vec<SpendRecord>) -> Self {
        let total_usd = by_category.iter().map(|r| r.amount).sum();
        Self {
            period_start: window.start,
            period_end: window.end,
            total_usd,
            by_category,
        }
    }

    pub fn window(&self) -> SpendWindow {
        SpendWindow::new(self.period_start, self.period_end)
    }

    /// Number of days in the window, never below one.
    pub fn days(&self) -> i64 {
        self.window().days().max(1)
    }

    pub fn daily_average(&self) -> f64 {
        self.total_usd / self.days() as f64
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Live,
    Fallback,
}

/// USD to INR conversion, resolved once per report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub usd_to_inr: f64,
    pub source: RateSource,
}

impl ExchangeRate {
    pub fn live(usd_to_inr: f64) -> Self {
        Self {
            usd_to_inr,
            source: RateSource::Live,
        }
    }

    pub fn fallback() -> Self {
        Self {
            usd_to_inr: FALLBACK_USD_TO_INR,
            source: RateSource::Fallback,
        }
    }

    pub fn convert(&self, usd: f64) -> f64 {
        usd * self.usd_to_inr
    }
}

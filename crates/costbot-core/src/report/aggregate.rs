//! Cost aggregation: grouped provider records reduced into per-category totals.
//! Pass your cost source when constructing: `CostAggregator::new(&source, &settings)`.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::{AggregateReport, SpendRecord, SpendWindow};
use crate::config::{CostMetric, CreditPolicy, Granularity, ReportSettings};
use crate::error::ReportError;

/// Error from the cost-reporting provider.
#[derive(Debug, Clone)]
pub struct CostSourceError(pub String);

impl std::fmt::Display for CostSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CostSourceError {}

/// Grouped spend request for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostQuery {
    pub window: SpendWindow,
    pub granularity: Granularity,
    pub metric: CostMetric,
}

/// One time bucket of grouped spend as returned by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CostBucket {
    pub period_start: NaiveDate,
    pub groups: Vec<SpendRecord>,
    /// Provider flagged the bucket as not final yet.
    pub estimated: bool,
}

/// Cost-reporting provider abstraction. Implement and pass to [`CostAggregator::new`].
pub trait CostSource: Send + Sync {
    fn grouped_spend(&self, query: &CostQuery) -> Result<Vec<CostBucket>, CostSourceError>;

    /// Short provider name for logs and errors.
    fn provider(&self) -> &str {
        "cost_source"
    }
}

pub struct CostAggregator<'a> {
    source: &'a dyn CostSource,
    granularity: Granularity,
    metric: CostMetric,
    credit_policy: CreditPolicy,
}

impl<'a> CostAggregator<'a> {
    pub fn new(source: &'a dyn CostSource, settings: &ReportSettings) -> Self {
        Self {
            source,
            granularity: settings.granularity,
            metric: settings.metric,
            credit_policy: settings.credit_policy,
        }
    }

    /// Fetch spend for `[period_start, period_end)` and reduce it.
    ///
    /// Fails with [`ReportError::UpstreamUnavailable`] rather than returning an empty report when
    /// the provider call fails or the range is malformed.
    pub fn aggregate(
        &self,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<AggregateReport, ReportError> {
        let window = SpendWindow::new(period_start, period_end);
        let provider = self.source.provider();
        if !window.is_valid() {
            return Err(ReportError::upstream(
                provider,
                format!("malformed date range {} - {}", period_start, period_end),
            ));
        }
        let query = CostQuery {
            window,
            granularity: self.granularity,
            metric: self.metric,
        };
        debug!(
            event = "cost.request_configured",
            domain = "cost",
            provider = provider,
            start = %period_start,
            end = %period_end,
            granularity = self.granularity.as_str(),
            metric = self.metric.as_str()
        );
        let buckets = self.source.grouped_spend(&query).map_err(|err| {
            warn!(
                event = "cost.request_failed",
                domain = "cost",
                provider = provider,
                error = %err
            );
            ReportError::upstream(provider, err.0)
        })?;

        let estimated = buckets.iter().filter(|b| b.estimated).count();
        let by_category = reduce(&buckets, self.credit_policy);
        let report = AggregateReport::from_records(window, by_category);
        info!(
            event = "cost.aggregated",
            domain = "cost",
            provider = provider,
            buckets = buckets.len() as u64,
            estimated_buckets = estimated as u64,
            categories = report.by_category.len() as u64,
            total_usd = report.total_usd
        );
        Ok(report)
    }
}

/// Sum records per category under `policy`, then order by total descending, name ascending.
pub fn reduce(buckets: &[CostBucket], policy: CreditPolicy) -> Vec<SpendRecord> {
    let mut by_cat: HashMap<&str, f64> = HashMap::new();
    for record in buckets.iter().flat_map(|b| b.groups.iter()) {
        if !record.amount.is_finite() {
            continue;
        }
        match policy {
            CreditPolicy::Exclude => {
                if record.amount > 0.0 {
                    *by_cat.entry(record.category.as_str()).or_insert(0.0) += record.amount;
                }
            }
            CreditPolicy::Net => {
                *by_cat.entry(record.category.as_str()).or_insert(0.0) += record.amount;
            }
        }
    }
    let mut records: Vec<SpendRecord> = by_cat
        .into_iter()
        .filter(|(_, total)| *total > 0.0)
        .map(|(category, total)| SpendRecord::new(category, total))
        .collect();
    records.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.category.cmp(&b.category))
    });
    records
}

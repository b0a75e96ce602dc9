//! Process configuration: read once at startup and passed by reference into every component.
//!
//! Values come from named environment variables (see [`CostbotConfig::from_env`]). A missing
//! required value fails startup with [`ReportError::ConfigurationMissing`]; nothing is read
//! per request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReportError;

pub const DEFAULT_WINDOW_DAYS: u32 = 30;
/// Cost Explorer keeps roughly fourteen months of history; one year is the usable maximum.
pub const MAX_WINDOW_DAYS: u32 = 366;
pub const DEFAULT_REPORT_KEYWORD: &str = "bills";
pub const DEFAULT_MANUAL_PATH: &str = "/scheduled-report";
/// Daily at 09:00 UTC (7-field: sec min hour day month dow year).
pub const DEFAULT_SCHEDULE: &str = "0 0 9 * * * *";
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// String that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Time-bucket size requested from the cost provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    Daily,
    Monthly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "DAILY",
            Granularity::Monthly => "MONTHLY",
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Granularity::Daily),
            "monthly" => Ok(Granularity::Monthly),
            other => Err(format!("expected DAILY or MONTHLY, got '{}'", other)),
        }
    }
}

/// Cost kind summed into the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostMetric {
    UnblendedCost,
    AmortizedCost,
    BlendedCost,
    NetUnblendedCost,
}

impl CostMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostMetric::UnblendedCost => "UnblendedCost",
            CostMetric::AmortizedCost => "AmortizedCost",
            CostMetric::BlendedCost => "BlendedCost",
            CostMetric::NetUnblendedCost => "NetUnblendedCost",
        }
    }
}

impl FromStr for CostMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unblendedcost" | "unblended" => Ok(CostMetric::UnblendedCost),
            "amortizedcost" | "amortized" => Ok(CostMetric::AmortizedCost),
            "blendedcost" | "blended" => Ok(CostMetric::BlendedCost),
            "netunblendedcost" | "net_unblended" => Ok(CostMetric::NetUnblendedCost),
            other => Err(format!("unknown cost metric '{}'", other)),
        }
    }
}

/// What to do with amounts <= 0 (credits, refunds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditPolicy {
    /// Drop every record with amount <= 0 before summing.
    #[default]
    Exclude,
    /// Net credits into their category, then drop categories whose net total is <= 0.
    Net,
}

impl FromStr for CreditPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclude" => Ok(CreditPolicy::Exclude),
            "net" => Ok(CreditPolicy::Net),
            other => Err(format!("expected exclude or net, got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateProvider {
    #[default]
    AlphaVantage,
    ExchangeRateApi,
}

impl FromStr for RateProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "alpha_vantage" | "alphavantage" => Ok(RateProvider::AlphaVantage),
            "exchangerate_api" | "exchange_rate_api" => Ok(RateProvider::ExchangeRateApi),
            other => Err(format!("unknown rate provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackConfig {
    pub bot_token: Secret,
    pub channel_id: String,
    pub signing_secret: Secret,
    /// When set, scheduled and manual reports go through this incoming webhook.
    pub webhook_url: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    pub access_key_id: String,
    pub secret_access_key: Secret,
    pub session_token: Option<Secret>,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateConfig {
    pub provider: RateProvider,
    /// Without a key the live quote is skipped and the fallback rate is used.
    pub api_key: Option<Secret>,
}

/// Report shape and trigger routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSettings {
    pub window_days: u32,
    pub granularity: Granularity,
    pub metric: CostMetric,
    pub credit_policy: CreditPolicy,
    pub keyword: String,
    pub manual_path: String,
    pub schedule: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            granularity: Granularity::Monthly,
            metric: CostMetric::UnblendedCost,
            credit_policy: CreditPolicy::Exclude,
            keyword: DEFAULT_REPORT_KEYWORD.to_string(),
            manual_path: DEFAULT_MANUAL_PATH.to_string(),
            schedule: DEFAULT_SCHEDULE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostbotConfig {
    pub slack: SlackConfig,
    pub aws: AwsConfig,
    pub rate: RateConfig,
    pub report: ReportSettings,
}

impl CostbotConfig {
    /// Build from process environment.
    ///
    /// Required: `SLACK_BOT_TOKEN`, `SLACK_CHANNEL_ID`, `SLACK_SIGNING_SECRET`,
    /// `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`.
    /// Optional: `SLACK_WEBHOOK_URL`, `AWS_SESSION_TOKEN`, `AWS_REGION`, `COSTBOT_RATE_PROVIDER`,
    /// `ALPHA_VANTAGE_API_KEY` / `EXCHANGE_RATE_API_KEY`, `COSTBOT_WINDOW_DAYS`,
    /// `COSTBOT_GRANULARITY`, `COSTBOT_COST_METRIC`, `COSTBOT_CREDIT_POLICY`,
    /// `COSTBOT_REPORT_KEYWORD`, `COSTBOT_MANUAL_PATH`, `COSTBOT_SCHEDULE`.
    pub fn from_env() -> Result<Self, ReportError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require =
            |key: &str| get(key).ok_or_else(|| ReportError::ConfigurationMissing(key.into()));

        let slack = SlackConfig {
            bot_token: Secret::new(require("SLACK_BOT_TOKEN")?),
            channel_id: require("SLACK_CHANNEL_ID")?,
            signing_secret: Secret::new(require("SLACK_SIGNING_SECRET")?),
            webhook_url: get("SLACK_WEBHOOK_URL").map(Secret::new),
        };
        let aws = AwsConfig {
            access_key_id: require("AWS_ACCESS_KEY_ID")?,
            secret_access_key: Secret::new(require("AWS_SECRET_ACCESS_KEY")?),
            session_token: get("AWS_SESSION_TOKEN").map(Secret::new),
            region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
        };

        let provider = parse_or_default(&get, "COSTBOT_RATE_PROVIDER", RateProvider::default())?;
        let key_name = match provider {
            RateProvider::AlphaVantage => "ALPHA_VANTAGE_API_KEY",
            RateProvider::ExchangeRateApi => "EXCHANGE_RATE_API_KEY",
        };
        let rate = RateConfig {
            provider,
            api_key: get(key_name).map(Secret::new),
        };

        let defaults = ReportSettings::default();
        let window_days: u32 = parse_or_default(&get, "COSTBOT_WINDOW_DAYS", defaults.window_days)?;
        if !(1..=MAX_WINDOW_DAYS).contains(&window_days) {
            return Err(ReportError::invalid_config(
                "COSTBOT_WINDOW_DAYS",
                format!("window must cover 1 to {} days", MAX_WINDOW_DAYS),
            ));
        }
        let report = ReportSettings {
            window_days,
            granularity: parse_or_default(&get, "COSTBOT_GRANULARITY", defaults.granularity)?,
            metric: parse_or_default(&get, "COSTBOT_COST_METRIC", defaults.metric)?,
            credit_policy: parse_or_default(&get, "COSTBOT_CREDIT_POLICY", defaults.credit_policy)?,
            keyword: get("COSTBOT_REPORT_KEYWORD").unwrap_or(defaults.keyword),
            manual_path: get("COSTBOT_MANUAL_PATH").unwrap_or(defaults.manual_path),
            schedule: get("COSTBOT_SCHEDULE").unwrap_or(defaults.schedule),
        };

        Ok(Self {
            slack,
            aws,
            rate,
            report,
        })
    }
}

fn parse_or_default<T, G>(get: &G, key: &str, default: T) -> Result<T, ReportError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ReportError::invalid_config(key, e.to_string())),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> CostbotConfig {
    CostbotConfig {
        slack: SlackConfig {
            bot_token: Secret::new("xoxb-test"),
            channel_id: "C0REPORTS".to_string(),
            signing_secret: Secret::new("signing-secret"),
            webhook_url: None,
        },
        aws: AwsConfig {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: Secret::new("secret"),
            session_token: None,
            region: DEFAULT_AWS_REGION.to_string(),
        },
        rate: RateConfig {
            provider: RateProvider::AlphaVantage,
            api_key: Some(Secret::new("demo")),
        },
        report: ReportSettings::default(),
    }
}

//! AWS Cost Explorer `GetCostAndUsage` client, grouped by SERVICE.

mod sigv4;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use costbot_core::config::AwsConfig;
use costbot_core::report::{CostBucket, CostQuery, CostSource, CostSourceError};
use costbot_core::SpendRecord;

use crate::http::{HttpRequest, HttpTransport, send_logged, snippet, url_host};

pub use sigv4::{Credentials, SigningInput, sign, signing_key};

const SERVICE: &str = "ce";
const TARGET: &str = "AWSInsightsIndexService.GetCostAndUsage";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const GROUP_BY_KEY: &str = "SERVICE";

/// Upper bound on followed `NextPageToken`s.
pub const MAX_PAGES: usize = 50;

pub fn endpoint_for(region: &str) -> String {
    format!("https://ce.{}.amazonaws.com/", region)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetCostAndUsageRequest<'a> {
    time_period: DateInterval,
    granularity: &'a str,
    metrics: [&'a str; 1],
    group_by: [GroupDefinition; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    next_page_token: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DateInterval {
    start: String,
    end: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GroupDefinition {
    #[serde(rename = "Type")]
    kind: &'static str,
    key: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetCostAndUsageResponse {
    #[serde(default)]
    results_by_time: Vec<ResultByTime>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultByTime {
    time_period: DateInterval,
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    estimated: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Group {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    metrics: HashMap<String, MetricValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetricValue {
    amount: String,
}

/// AWS JSON error envelope (`__type` is `namespace#ErrorName`).
#[derive(Debug, Deserialize)]
struct AwsErrorBody {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<AwsErrorBody>(body) {
        Ok(AwsErrorBody { kind, message }) if kind.is_some() || message.is_some() => {
            let kind = kind
                .as_deref()
                .map(|k| k.rsplit('#').next().unwrap_or(k))
                .unwrap_or("UnknownError");
            format!(
                "status={} {}: {}",
                status,
                kind,
                message.as_deref().unwrap_or("no message")
            )
        }
        _ => format!("status={} body={}", status, snippet(body)),
    }
}

fn to_bucket(result: ResultByTime, metric: &str) -> Result<CostBucket, CostSourceError> {
    let period_start = NaiveDate::parse_from_str(&result.time_period.start, "%Y-%m-%d")
        .map_err(|e| {
            CostSourceError(format!(
                "malformed TimePeriod.Start '{}': {}",
                result.time_period.start, e
            ))
        })?;
    let mut groups = Vec::with_capacity(result.groups.len());
    for group in result.groups {
        let category = group
            .keys
            .first()
            .cloned()
            .ok_or_else(|| CostSourceError("group without keys".into()))?;
        let raw = group
            .metrics
            .get(metric)
            .ok_or_else(|| {
                CostSourceError(format!("group '{}' missing metric {}", category, metric))
            })?;
        let amount = raw.amount.trim().parse::<f64>().map_err(|_| {
            CostSourceError(format!(
                "group '{}' has non-numeric amount '{}'",
                category, raw.amount
            ))
        })?;
        groups.push(SpendRecord::new(category, amount));
    }
    Ok(CostBucket {
        period_start,
        groups,
        estimated: result.estimated,
    })
}

pub struct CostExplorerClient {
    transport: Arc<dyn HttpTransport>,
    credentials: Credentials,
    region: String,
    endpoint: String,
}

impl CostExplorerClient {
    pub fn new(transport: Arc<dyn HttpTransport>, credentials: Credentials, region: &str) -> Self {
        Self {
            transport,
            credentials,
            region: region.to_string(),
            endpoint: endpoint_for(region),
        }
    }

    pub fn from_config(transport: Arc<dyn HttpTransport>, aws: &AwsConfig) -> Self {
        let credentials = Credentials {
            access_key_id: aws.access_key_id.clone(),
            secret_access_key: aws.secret_access_key.expose().to_string(),
            session_token: aws.session_token.as_ref().map(|t| t.expose().to_string()),
        };
        Self::new(transport, credentials, &aws.region)
    }

    fn fetch_page(
        &self,
        query: &CostQuery,
        page_token: Option<&str>,
    ) -> Result<GetCostAndUsageResponse, CostSourceError> {
        let request_body = GetCostAndUsageRequest {
            time_period: DateInterval {
                start: query.window.start.format("%Y-%m-%d").to_string(),
                end: query.window.end.format("%Y-%m-%d").to_string(),
            },
            granularity: query.granularity.as_str(),
            metrics: [query.metric.as_str()],
            group_by: [GroupDefinition {
                kind: "DIMENSION",
                key: GROUP_BY_KEY,
            }],
            next_page_token: page_token,
        };
        let body =
            serde_json::to_string(&request_body).map_err(|e| CostSourceError(e.to_string()))?;

        let host = url_host(&self.endpoint)
            .ok_or_else(|| CostSourceError(format!("invalid endpoint '{}'", self.endpoint)))?;
        let signed = sign(
            &self.credentials,
            &SigningInput {
                method: "POST",
                host,
                path: "/",
                canonical_query: "",
                headers: &[("content-type", CONTENT_TYPE), ("x-amz-target", TARGET)],
                body: body.as_bytes(),
                region: &self.region,
                service: SERVICE,
            },
            Utc::now(),
        );
        let mut request = HttpRequest::post(&self.endpoint, body)
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", TARGET);
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let response = send_logged(self.transport.as_ref(), &request, "cost")
            .map_err(|e| CostSourceError(e.to_string()))?;
        if !response.is_success() {
            return Err(CostSourceError(describe_error(
                response.status,
                &response.body,
            )));
        }
        serde_json::from_str(&response.body).map_err(|e| {
            CostSourceError(format!("malformed GetCostAndUsage response: {}", e))
        })
    }
}

impl CostSource for CostExplorerClient {
    fn grouped_spend(&self, query: &CostQuery) -> Result<Vec<CostBucket>, CostSourceError> {
        let metric = query.metric.as_str();
        let mut buckets = Vec::new();
        let mut token: Option<String> = None;
        for page in 1..=MAX_PAGES {
            let response = self.fetch_page(query, token.as_deref())?;
            debug!(
                event = "cost.page_received",
                domain = "cost",
                page = page as u64,
                results = response.results_by_time.len() as u64,
                has_next = response.next_page_token.is_some()
            );
            for result in response.results_by_time {
                buckets.push(to_bucket(result, metric)?);
            }
            match response.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => token = Some(next),
                None => {
                    info!(
                        event = "cost.request_succeeded",
                        domain = "cost",
                        pages = page as u64,
                        buckets = buckets.len() as u64
                    );
                    return Ok(buckets);
                }
            }
        }
        warn!(
            event = "cost.page_limit_reached",
            domain = "cost",
            max_pages = MAX_PAGES as u64
        );
        Err(CostSourceError(format!(
            "pagination did not finish within {} pages",
            MAX_PAGES
        )))
    }

    fn provider(&self) -> &str {
        "cost_explorer"
    }
}

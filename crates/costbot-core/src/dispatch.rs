//! One-shot dispatch of an inbound trigger: classify, act, answer with an [`InvocationResult`].

use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::config::CostbotConfig;
use crate::delivery::{Destination, MessagePoster};
use crate::error::ReportError;
use crate::report::{
    CostAggregator, CostSource, RateQuoter, RateResolver, SpendWindow, format_report,
};
use crate::signature::verify_request;
use crate::trigger::{AppMention, ChatEnvelope, ChatEvent, Classified, Trigger, classify};

/// Lambda proxy response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl InvocationResult {
    fn new(status_code: u16, body: String) -> Self {
        Self { status_code, body }
    }

    /// Body is the JSON encoding of `message`.
    fn message(status_code: u16, message: &str) -> Self {
        Self::new(status_code, Value::String(message.to_string()).to_string())
    }

    pub fn internal_error(message: &str) -> Self {
        Self::message(500, &format!("Internal server error: {}", message))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTrigger {
    Scheduled,
    Manual,
}

impl ReportTrigger {
    fn success_message(self) -> &'static str {
        match self {
            ReportTrigger::Scheduled => "Daily cost report sent successfully",
            ReportTrigger::Manual => "Cost report sent successfully",
        }
    }

    fn failure_label(self) -> &'static str {
        match self {
            ReportTrigger::Scheduled => "Daily cost report failed",
            ReportTrigger::Manual => "Cost report failed",
        }
    }
}

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Challenge(String),
    ReportDelivered(ReportTrigger),
    ReportFailed {
        trigger: ReportTrigger,
        error: ReportError,
    },
    /// Mention answered; `report` is false for the greeting.
    Replied { report: bool },
    /// Mention path failed. `reply_error` is set when the error reply could not be posted either.
    MentionFailed {
        error: ReportError,
        reply_error: Option<ReportError>,
    },
    Acknowledged,
    Unauthorized(ReportError),
    Unsupported(ReportError),
}

impl Outcome {
    pub fn into_result(self) -> InvocationResult {
        match self {
            Outcome::Challenge(token) => {
                InvocationResult::new(200, json!({ "challenge": token }).to_string())
            }
            Outcome::ReportDelivered(trigger) => {
                InvocationResult::message(200, trigger.success_message())
            }
            Outcome::ReportFailed { trigger, error } => InvocationResult::message(
                200,
                &format!("{}: {}", trigger.failure_label(), error),
            ),
            Outcome::Replied { .. } | Outcome::MentionFailed { .. } | Outcome::Acknowledged => {
                InvocationResult::new(200, String::new())
            }
            Outcome::Unauthorized(_) => InvocationResult::message(401, "Invalid request signature"),
            Outcome::Unsupported(_) => InvocationResult::message(400, "Unsupported event type"),
        }
    }
}

/// Injected providers. `broadcaster` pushes scheduled/manual reports, `replier` answers mentions.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub costs: &'a dyn CostSource,
    pub rates: Option<&'a dyn RateQuoter>,
    pub broadcaster: &'a dyn MessagePoster,
    pub replier: &'a dyn MessagePoster,
}

pub struct Dispatcher<'a> {
    config: &'a CostbotConfig,
    collaborators: Collaborators<'a>,
    clock: Option<DateTime<Utc>>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a CostbotConfig, collaborators: Collaborators<'a>) -> Self {
        Self {
            config,
            collaborators,
            clock: None,
        }
    }

    /// Pin the clock used for the report window and signature freshness.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    /// Resolve the rate, aggregate the trailing window, render.
    pub fn generate_report(&self) -> Result<String, ReportError> {
        let rate = RateResolver::new(self.collaborators.rates).resolve();
        let window = SpendWindow::trailing(self.now().date_naive(), self.config.report.window_days)
            .ok_or_else(|| {
                ReportError::invalid_config(
                    "COSTBOT_WINDOW_DAYS",
                    "window start precedes the supported date range",
                )
            })?;
        let report = CostAggregator::new(self.collaborators.costs, &self.config.report)
            .aggregate(window.start, window.end)?;
        Ok(format_report(&report, &rate))
    }

    /// Inbound entry point. Never panics past this boundary.
    pub fn handle(&self, event: &Value) -> InvocationResult {
        let invocation_id = Uuid::new_v4();
        let span = info_span!("invocation", invocation_id = %invocation_id);
        let _entered = span.enter();

        match panic::catch_unwind(AssertUnwindSafe(|| self.route(event))) {
            Ok(outcome) => outcome.into_result(),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    event = "dispatch.panicked",
                    domain = "dispatch",
                    error = %message
                );
                InvocationResult::internal_error(&message)
            }
        }
    }

    fn route(&self, event: &Value) -> Outcome {
        match classify(event, &self.config.report.manual_path) {
            Classified::Trigger(trigger) => {
                info!(
                    event = "dispatch.trigger_classified",
                    domain = "dispatch",
                    trigger = trigger.kind()
                );
                self.dispatch(trigger)
            }
            Classified::Unsupported { reason } => {
                warn!(
                    event = "dispatch.trigger_unsupported",
                    domain = "dispatch",
                    reason = %reason
                );
                Outcome::Unsupported(ReportError::UnsupportedTrigger(reason))
            }
        }
    }

    pub fn dispatch(&self, trigger: Trigger) -> Outcome {
        match trigger {
            Trigger::VerificationChallenge(token) => Outcome::Challenge(token),
            Trigger::ScheduledTick => self.push_report(ReportTrigger::Scheduled),
            Trigger::ManualRequest => self.push_report(ReportTrigger::Manual),
            Trigger::ChatEvent(chat) => self.on_chat_event(chat),
        }
    }

    fn push_report(&self, trigger: ReportTrigger) -> Outcome {
        let destination = Destination::channel(&self.config.slack.channel_id);
        let delivered = self.generate_report().and_then(|text| {
            self.collaborators
                .broadcaster
                .post(&destination, &text)
                .map_err(|err| ReportError::delivery(destination.to_string(), err.0))
        });
        match delivered {
            Ok(()) => {
                info!(
                    event = "dispatch.report_delivered",
                    domain = "dispatch",
                    destination = %destination
                );
                Outcome::ReportDelivered(trigger)
            }
            Err(error) => {
                error!(
                    event = "dispatch.report_failed",
                    domain = "dispatch",
                    code = error.code(),
                    error = %error
                );
                Outcome::ReportFailed { trigger, error }
            }
        }
    }

    fn on_chat_event(&self, chat: ChatEvent) -> Outcome {
        if let Err(err) = verify_request(
            self.config.slack.signing_secret.expose(),
            &chat.headers,
            &chat.raw_body,
            self.now().timestamp(),
        ) {
            warn!(
                event = "dispatch.signature_rejected",
                domain = "dispatch",
                error = %err
            );
            return Outcome::Unauthorized(err);
        }

        match chat.envelope {
            ChatEnvelope::Mention(mention) => self.on_mention(mention),
            ChatEnvelope::OtherEvent { event_type } => {
                info!(
                    event = "dispatch.event_acknowledged",
                    domain = "dispatch",
                    event_type = %event_type
                );
                Outcome::Acknowledged
            }
            ChatEnvelope::Unrecognized { kind } => {
                info!(
                    event = "dispatch.event_acknowledged",
                    domain = "dispatch",
                    kind = %kind
                );
                Outcome::Acknowledged
            }
        }
    }

    fn on_mention(&self, mention: AppMention) -> Outcome {
        let report = mention.requests_report(&self.config.report.keyword);
        let destination = if report {
            Destination::channel(&mention.channel).in_thread(mention.thread_ts.clone())
        } else {
            Destination::channel(&mention.channel)
        };
        let text = if report {
            match self.generate_report() {
                Ok(text) => text,
                Err(err) => {
                    error!(
                        event = "dispatch.report_failed",
                        domain = "dispatch",
                        code = err.code(),
                        error = %err
                    );
                    let reply = format!("❌ *Error fetching AWS costs:* {}", err);
                    let reply_error = self.reply(&destination, &reply).err();
                    return Outcome::MentionFailed {
                        error: err,
                        reply_error,
                    };
                }
            }
        } else {
            format!("Hey <@{}>!", mention.user)
        };

        match self.reply(&destination, &text) {
            Ok(()) => Outcome::Replied { report },
            Err(err) => Outcome::MentionFailed {
                error: err,
                reply_error: None,
            },
        }
    }

    fn reply(&self, destination: &Destination, text: &str) -> Result<(), ReportError> {
        self.collaborators
            .replier
            .post(destination, text)
            .map_err(|err| {
                warn!(
                    event = "dispatch.reply_failed",
                    domain = "dispatch",
                    destination = %destination,
                    error = %err
                );
                ReportError::delivery(destination.to_string(), err.0)
            })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::config::test_config;
    use crate::delivery::DeliveryError;
    use crate::report::{CostBucket, CostQuery, CostSourceError, QuoteError, SpendRecord};
    use crate::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER, slack_signature};

    struct MockCosts {
        result: Result<Vec<CostBucket>, CostSourceError>,
        queries: Mutex<Vec<CostQuery>>,
    }

    impl MockCosts {
        fn ok(records: Vec<SpendRecord>) -> Self {
            let bucket = CostBucket {
                period_start: NaiveDate::from_ymd_opt(2026, 9, 19).unwrap(),
                groups: records,
                estimated: false,
            };
            Self {
                result: Ok(vec![bucket]),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                result: Err(CostSourceError(message.to_string())),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    impl CostSource for MockCosts {
        fn grouped_spend(&self, query: &CostQuery) -> Result<Vec<CostBucket>, CostSourceError> {
            self.queries.lock().unwrap().push(query.clone());
            self.result.clone()
        }

        fn provider(&self) -> &str {
            "mock_costs"
        }
    }

    struct PanickingCosts;

    impl CostSource for PanickingCosts {
        fn grouped_spend(&self, _query: &CostQuery) -> Result<Vec<CostBucket>, CostSourceError> {
            panic!("cost source exploded")
        }
    }

    struct FixedQuote(Result<f64, QuoteError>);

    impl RateQuoter for FixedQuote {
        fn quote_usd_to_inr(&self) -> Result<f64, QuoteError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingPoster {
        fail: bool,
        sent: Mutex<Vec<(Destination, String)>>,
    }

    impl RecordingPoster {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(Destination, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MessagePoster for RecordingPoster {
        fn post(&self, destination: &Destination, text: &str) -> Result<(), DeliveryError> {
            self.sent
                .lock()
                .unwrap()
                .push((destination.clone(), text.to_string()));
            if self.fail {
                Err(DeliveryError("channel_not_found".into()))
            } else {
                Ok(())
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn sample_records() -> Vec<SpendRecord> {
        vec![
            SpendRecord::new("EC2", 120.0),
            SpendRecord::new("S3", 30.0),
            SpendRecord::new("Tax", -1.39),
        ]
    }

    fn signed_chat_event(body: &str, secret: &str) -> Value {
        let ts = now().timestamp();
        let headers: HashMap<&str, String> = HashMap::from([
            (TIMESTAMP_HEADER, ts.to_string()),
            (SIGNATURE_HEADER, slack_signature(secret, ts, body.as_bytes())),
        ]);
        json!({ "path": "/slack-events", "headers": headers, "body": body })
    }

    fn mention_body(text: &str, thread_ts: Option<&str>) -> String {
        let mut event = json!({
            "type": "app_mention",
            "user": "U42",
            "channel": "C77",
            "text": text
        });
        if let Some(ts) = thread_ts {
            event["thread_ts"] = json!(ts);
        }
        json!({ "type": "event_callback", "event": event }).to_string()
    }

    struct Harness {
        config: CostbotConfig,
        costs: MockCosts,
        quote: FixedQuote,
        broadcaster: RecordingPoster,
        replier: RecordingPoster,
    }

    impl Harness {
        fn new(costs: MockCosts) -> Self {
            Self {
                config: test_config(),
                costs,
                quote: FixedQuote(Ok(85.0)),
                broadcaster: RecordingPoster::default(),
                replier: RecordingPoster::default(),
            }
        }

        fn dispatcher(&self) -> Dispatcher<'_> {
            Dispatcher::new(
                &self.config,
                Collaborators {
                    costs: &self.costs,
                    rates: Some(&self.quote),
                    broadcaster: &self.broadcaster,
                    replier: &self.replier,
                },
            )
            .at(now())
        }
    }

    #[test]
    fn verification_challenge_echoes_token() {
        let h = Harness::new(MockCosts::ok(Vec::new()));
        let result = h
            .dispatcher()
            .handle(&json!({ "body": r#"{"type":"url_verification","challenge":"tok-1"}"# }));
        assert_eq!(result.status_code, 200);
        assert_eq!(result.body, r#"{"challenge":"tok-1"}"#);
        assert_eq!(h.costs.calls(), 0);
    }

    #[test]
    fn scheduled_tick_pushes_report_to_configured_channel() {
        let h = Harness::new(MockCosts::ok(sample_records()));
        let result = h.dispatcher().handle(&json!({ "source": "aws.events" }));
        assert_eq!(
            result,
            InvocationResult {
                status_code: 200,
                body: "\"Daily cost report sent successfully\"".into()
            }
        );
        let sent = h.broadcaster.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Destination::channel("C0REPORTS"));
        assert!(sent[0].1.contains("▹ EC2 - $120.00 (₹10200.00)"));
        assert!(sent[0].1.contains("▹ S3 - $30.00 (₹2550.00)"));
        assert!(!sent[0].1.contains("Tax"));
        assert!(sent[0].1.contains("▹ *Daily Average Cost* - $5.00 (₹425.00)"));
        assert!(h.replier.sent().is_empty());
    }

    #[test]
    fn report_window_is_trailing_thirty_days() {
        let h = Harness::new(MockCosts::ok(sample_records()));
        h.dispatcher().handle(&json!({ "detail-type": "Scheduled Event" }));
        let queries = h.costs.queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(
            queries[0].window,
            SpendWindow::new(
                NaiveDate::from_ymd_opt(2026, 9, 19).unwrap(),
                NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
            )
        );
    }

    #[test]
    fn manual_request_uses_its_own_message() {
        let h = Harness::new(MockCosts::ok(sample_records()));
        let result = h
            .dispatcher()
            .handle(&json!({ "path": "/scheduled-report", "httpMethod": "POST" }));
        assert_eq!(result.status_code, 200);
        assert_eq!(result.body, "\"Cost report sent successfully\"");
        assert_eq!(h.broadcaster.sent().len(), 1);
    }

    #[test]
    fn cost_failure_pushes_nothing_and_reports_failure() {
        let h = Harness::new(MockCosts::failing("AccessDeniedException"));
        let result = h.dispatcher().handle(&json!({ "source": "aws.events" }));
        assert_eq!(result.status_code, 200);
        assert!(result.body.contains("Daily cost report failed"), "{}", result.body);
        assert!(result.body.contains("AccessDeniedException"), "{}", result.body);
        assert!(h.broadcaster.sent().is_empty());
    }

    #[test]
    fn rate_failure_still_delivers_with_fallback() {
        let mut h = Harness::new(MockCosts::ok(vec![SpendRecord::new("Lambda", 10.0)]));
        h.quote = FixedQuote(Err(QuoteError("rate limited".into())));
        let outcome = h.dispatcher().dispatch(Trigger::ScheduledTick);
        assert_eq!(outcome, Outcome::ReportDelivered(ReportTrigger::Scheduled));
        assert!(h.broadcaster.sent()[0].1.contains("(₹833.40)"));
    }

    #[test]
    fn delivery_failure_is_reflected_in_outcome() {
        let mut h = Harness::new(MockCosts::ok(sample_records()));
        h.broadcaster = RecordingPoster::failing();
        let outcome = h.dispatcher().dispatch(Trigger::ManualRequest);
        let Outcome::ReportFailed { trigger, error } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(trigger, ReportTrigger::Manual);
        assert_eq!(error.code(), "delivery_failed");
    }

    #[test]
    fn mention_with_keyword_replies_in_thread() {
        let h = Harness::new(MockCosts::ok(sample_records()));
        let body = mention_body("<@B1> BILLS please", Some("1700.01"));
        let result = h
            .dispatcher()
            .handle(&signed_chat_event(&body, "signing-secret"));
        assert_eq!(result.status_code, 200);
        let sent = h.replier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].0,
            Destination::channel("C77").in_thread(Some("1700.01".into()))
        );
        assert!(sent[0].1.starts_with("📊 *AWS COST REPORT*"));
        assert!(h.broadcaster.sent().is_empty());
    }

    #[test]
    fn mention_without_keyword_greets_user() {
        let h = Harness::new(MockCosts::ok(sample_records()));
        let body = mention_body("<@B1> hello there", None);
        h.dispatcher()
            .handle(&signed_chat_event(&body, "signing-secret"));
        assert_eq!(
            h.replier.sent(),
            vec![(Destination::channel("C77"), "Hey <@U42>!".to_string())]
        );
        assert_eq!(h.costs.calls(), 0);
    }

    #[test]
    fn mention_cost_failure_posts_error_reply() {
        let h = Harness::new(MockCosts::failing("ThrottlingException"));
        let body = mention_body("bills", None);
        let result = h
            .dispatcher()
            .handle(&signed_chat_event(&body, "signing-secret"));
        assert_eq!(result.status_code, 200);
        let sent = h.replier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("❌ *Error fetching AWS costs:*"));
        assert!(sent[0].1.contains("ThrottlingException"));
    }

    #[test]
    fn mention_failure_keeps_error_reply_delivery_error() {
        let mut h = Harness::new(MockCosts::failing("ThrottlingException"));
        h.replier = RecordingPoster::failing();
        let body = mention_body("bills", None);
        let event = signed_chat_event(&body, "signing-secret");
        let Classified::Trigger(trigger) = classify(&event, &h.config.report.manual_path) else {
            panic!("expected chat trigger");
        };
        let Outcome::MentionFailed { error, reply_error } = h.dispatcher().dispatch(trigger) else {
            panic!("expected mention failure");
        };
        assert_eq!(error.code(), "upstream_unavailable");
        let reply_error = reply_error.expect("reply failure recorded");
        assert_eq!(reply_error.code(), "delivery_failed");
        assert!(reply_error.to_string().contains("channel_not_found"));
        assert_eq!(h.replier.sent().len(), 1);
    }

    #[test]
    fn greeting_reply_failure_has_no_separate_reply_error() {
        let mut h = Harness::new(MockCosts::ok(sample_records()));
        h.replier = RecordingPoster::failing();
        let body = mention_body("hello", None);
        let event = signed_chat_event(&body, "signing-secret");
        let Classified::Trigger(trigger) = classify(&event, &h.config.report.manual_path) else {
            panic!("expected chat trigger");
        };
        let outcome = h.dispatcher().dispatch(trigger);
        let Outcome::MentionFailed { error, reply_error } = outcome.clone() else {
            panic!("expected mention failure");
        };
        assert_eq!(error.code(), "delivery_failed");
        assert!(reply_error.is_none());
        assert_eq!(outcome.into_result(), InvocationResult::new(200, String::new()));
        assert_eq!(h.replier.sent().len(), 1);
    }

    #[test]
    fn window_beyond_calendar_fails_without_panic() {
        let mut h = Harness::new(MockCosts::ok(sample_records()));
        h.config.report.window_days = u32::MAX;
        let result = h.dispatcher().handle(&json!({ "source": "aws.events" }));
        assert_eq!(result.status_code, 200);
        assert!(result.body.contains("Daily cost report failed"), "{}", result.body);
        assert!(result.body.contains("COSTBOT_WINDOW_DAYS"), "{}", result.body);
        assert_eq!(h.costs.calls(), 0);
        assert!(h.broadcaster.sent().is_empty());
    }

    #[test]
    fn other_event_callback_is_acknowledged() {
        let h = Harness::new(MockCosts::ok(sample_records()));
        let body = json!({ "type": "event_callback", "event": { "type": "reaction_added" } })
            .to_string();
        let result = h
            .dispatcher()
            .handle(&signed_chat_event(&body, "signing-secret"));
        assert_eq!(result, InvocationResult::new(200, String::new()));
        assert!(h.replier.sent().is_empty());
        assert_eq!(h.costs.calls(), 0);
    }

    #[test]
    fn bad_signature_is_rejected_without_side_effects() {
        let h = Harness::new(MockCosts::ok(sample_records()));
        let body = mention_body("bills", None);
        let result = h
            .dispatcher()
            .handle(&signed_chat_event(&body, "wrong-secret"));
        assert_eq!(result.status_code, 401);
        assert!(h.replier.sent().is_empty());
        assert_eq!(h.costs.calls(), 0);
    }

    #[test]
    fn unsupported_event_returns_400_without_side_effects() {
        let h = Harness::new(MockCosts::ok(sample_records()));
        let result = h.dispatcher().handle(&json!({ "foo": "bar" }));
        assert_eq!(
            result,
            InvocationResult {
                status_code: 400,
                body: "\"Unsupported event type\"".into()
            }
        );
        assert_eq!(h.costs.calls(), 0);
        assert!(h.broadcaster.sent().is_empty());
        assert!(h.replier.sent().is_empty());
    }

    #[test]
    fn panic_is_mapped_to_internal_error() {
        let config = test_config();
        let poster = RecordingPoster::default();
        let dispatcher = Dispatcher::new(
            &config,
            Collaborators {
                costs: &PanickingCosts,
                rates: None,
                broadcaster: &poster,
                replier: &poster,
            },
        )
        .at(now());
        let result = dispatcher.handle(&json!({ "source": "aws.events" }));
        assert_eq!(result.status_code, 500);
        assert!(result.body.contains("Internal server error: cost source exploded"));
        assert!(poster.sent().is_empty());
    }

    #[test]
    fn result_serializes_in_proxy_shape() {
        let value = serde_json::to_value(InvocationResult::new(200, "ok".into())).unwrap();
        assert_eq!(value, json!({ "statusCode": 200, "body": "ok" }));
    }
}

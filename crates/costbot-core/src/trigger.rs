//! Inbound trigger classification.
//!
//! [`classify`] is the only place that inspects raw event shapes. Everything downstream matches
//! on [`Trigger`] exhaustively.
//!
//! Accepted shapes, checked in this order:
//! - `{ "body": { "type": "url_verification", "challenge": ... } }` (body may be a JSON string)
//! - scheduler event: `source == "aws.events"` or `detail-type == "Scheduled Event"`
//! - manual request: `path` equal to the configured manual path
//! - chat envelope: `{ "body": ..., "headers": { ... } }`

use std::collections::HashMap;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    ScheduledTick,
    ManualRequest,
    ChatEvent(ChatEvent),
    VerificationChallenge(String),
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::ScheduledTick => "scheduled_tick",
            Trigger::ManualRequest => "manual_request",
            Trigger::ChatEvent(_) => "chat_event",
            Trigger::VerificationChallenge(_) => "verification_challenge",
        }
    }
}

/// Chat platform request as received: raw body (signed bytes), lowercase headers, parsed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub raw_body: String,
    pub headers: HashMap<String, String>,
    pub envelope: ChatEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEnvelope {
    /// `event_callback` carrying an `app_mention`.
    Mention(AppMention),
    /// `event_callback` carrying any other event type.
    OtherEvent { event_type: String },
    /// Body is not an event callback (or not JSON at all).
    Unrecognized { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMention {
    pub user: String,
    pub channel: String,
    pub text: String,
    pub thread_ts: Option<String>,
}

impl AppMention {
    /// Case-insensitive keyword match on the mention text.
    pub fn requests_report(&self, keyword: &str) -> bool {
        let keyword = keyword.trim().to_lowercase();
        !keyword.is_empty() && self.text.to_lowercase().contains(&keyword)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Trigger(Trigger),
    Unsupported { reason: String },
}

fn unsupported(reason: impl Into<String>) -> Classified {
    Classified::Unsupported {
        reason: reason.into(),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

fn body_json(body: &Value) -> Option<Value> {
    match body {
        Value::String(s) => serde_json::from_str(s).ok(),
        Value::Object(_) => Some(body.clone()),
        _ => None,
    }
}

fn raw_body(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lowercase_headers(headers: &Value) -> HashMap<String, String> {
    headers
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.to_ascii_lowercase(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_envelope(body: Option<&Value>) -> ChatEnvelope {
    let Some(body) = body else {
        return ChatEnvelope::Unrecognized {
            kind: "unparsed".into(),
        };
    };
    let kind = str_field(body, "type").unwrap_or("unknown");
    if kind != "event_callback" {
        return ChatEnvelope::Unrecognized {
            kind: kind.to_string(),
        };
    }
    let Some(event) = body.get("event") else {
        return ChatEnvelope::OtherEvent {
            event_type: "missing".into(),
        };
    };
    let event_type = str_field(event, "type").unwrap_or("unknown");
    if event_type == "app_mention"
        && let (Some(user), Some(channel)) = (str_field(event, "user"), str_field(event, "channel"))
    {
        return ChatEnvelope::Mention(AppMention {
            user: user.to_string(),
            channel: channel.to_string(),
            text: str_field(event, "text").unwrap_or_default().to_string(),
            thread_ts: str_field(event, "thread_ts").map(String::from),
        });
    }
    ChatEnvelope::OtherEvent {
        event_type: event_type.to_string(),
    }
}

/// Map an inbound event to exactly one trigger, or to an explicit unsupported outcome.
pub fn classify(event: &Value, manual_path: &str) -> Classified {
    if !event.is_object() {
        return unsupported("event is not a JSON object");
    }

    let body = event.get("body");
    let parsed_body = body.and_then(body_json);
    if let Some(parsed) = &parsed_body
        && str_field(parsed, "type") == Some("url_verification")
    {
        return match str_field(parsed, "challenge") {
            Some(challenge) => {
                Classified::Trigger(Trigger::VerificationChallenge(challenge.into()))
            }
            None => unsupported("url_verification without challenge"),
        };
    }

    if str_field(event, "source") == Some("aws.events")
        || str_field(event, "detail-type") == Some("Scheduled Event")
    {
        return Classified::Trigger(Trigger::ScheduledTick);
    }

    if str_field(event, "path") == Some(manual_path) {
        return Classified::Trigger(Trigger::ManualRequest);
    }

    if let (Some(body), Some(headers)) = (body, event.get("headers")) {
        return Classified::Trigger(Trigger::ChatEvent(ChatEvent {
            raw_body: raw_body(body),
            headers: lowercase_headers(headers),
            envelope: parse_envelope(parsed_body.as_ref()),
        }));
    }

    unsupported("no known trigger shape")
}

//! Slack message posting: Web API `chat.postMessage` and incoming webhooks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use costbot_core::config::Secret;
use costbot_core::delivery::{DeliveryError, Destination, MessagePoster};

use crate::http::{HttpRequest, HttpTransport, send_logged, snippet};

pub const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SlackApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// Bot-token client. Success requires a 2xx status and `"ok": true`.
pub struct SlackClient {
    transport: Arc<dyn HttpTransport>,
    bot_token: Secret,
}

impl SlackClient {
    pub fn new(transport: Arc<dyn HttpTransport>, bot_token: Secret) -> Self {
        Self {
            transport,
            bot_token,
        }
    }
}

impl MessagePoster for SlackClient {
    fn post(&self, destination: &Destination, text: &str) -> Result<(), DeliveryError> {
        let payload = PostMessage {
            channel: &destination.channel,
            text,
            thread_ts: destination.thread_ts.as_deref(),
        };
        let body = serde_json::to_string(&payload).map_err(|e| DeliveryError(e.to_string()))?;
        let request = HttpRequest::post(SLACK_POST_MESSAGE_URL, body)
            .header("content-type", JSON_CONTENT_TYPE)
            .header(
                "authorization",
                format!("Bearer {}", self.bot_token.expose()),
            );
        let response = send_logged(self.transport.as_ref(), &request, "slack")
            .map_err(|e| DeliveryError(e.to_string()))?;
        if !response.is_success() {
            return Err(DeliveryError(format!(
                "chat.postMessage status={} body={}",
                response.status,
                snippet(&response.body)
            )));
        }
        let parsed: SlackApiResponse = serde_json::from_str(&response.body).map_err(|e| {
            DeliveryError(format!("chat.postMessage returned malformed body: {}", e))
        })?;
        if !parsed.ok {
            return Err(DeliveryError(format!(
                "chat.postMessage error: {}",
                parsed.error.as_deref().unwrap_or("unknown")
            )));
        }
        info!(
            event = "slack.message_posted",
            domain = "slack",
            destination = %destination,
            ts = parsed.ts.as_deref().unwrap_or("")
        );
        Ok(())
    }
}

/// Incoming webhook. The channel is fixed by the webhook; `destination` is only logged.
pub struct SlackWebhook {
    transport: Arc<dyn HttpTransport>,
    url: Secret,
}

impl SlackWebhook {
    pub fn new(transport: Arc<dyn HttpTransport>, url: Secret) -> Self {
        Self { transport, url }
    }
}

impl MessagePoster for SlackWebhook {
    fn post(&self, destination: &Destination, text: &str) -> Result<(), DeliveryError> {
        let body = serde_json::json!({ "text": text }).to_string();
        let request = HttpRequest::post(self.url.expose(), body)
            .header("content-type", JSON_CONTENT_TYPE);
        let response = send_logged(self.transport.as_ref(), &request, "slack")
            .map_err(|e| DeliveryError(e.to_string()))?;
        if !response.is_success() {
            return Err(DeliveryError(format!(
                "webhook status={} body={}",
                response.status,
                snippet(&response.body)
            )));
        }
        debug!(
            event = "slack.webhook_posted",
            domain = "slack",
            requested_destination = %destination
        );
        Ok(())
    }
}

//! Outbound messaging seam. Implementations live in `costbot-clients`.

use serde::{Deserialize, Serialize};

/// Where a message goes: a channel, optionally a thread inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl Destination {
    pub fn channel(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ts: None,
        }
    }

    pub fn in_thread(mut self, thread_ts: Option<String>) -> Self {
        self.thread_ts = thread_ts;
        self
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.thread_ts {
            Some(ts) => write!(f, "{} (thread {})", self.channel, ts),
            None => write!(f, "{}", self.channel),
        }
    }
}

/// Error from an outbound push. Not retried.
#[derive(Debug, Clone)]
pub struct DeliveryError(pub String);

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DeliveryError {}

/// Message push abstraction. Success means the platform acknowledged the message.
pub trait MessagePoster: Send + Sync {
    fn post(&self, destination: &Destination, text: &str) -> Result<(), DeliveryError>;
}

//! HTTP-backed providers for the cost report bot: Cost Explorer, exchange-rate quotes, Slack.
//! Use [`Providers::from_config`] to wire everything from a [`CostbotConfig`].

pub mod cost_explorer;
pub mod exchange_rate;
pub mod http;
pub mod slack;

use std::sync::Arc;

use costbot_core::{Collaborators, CostbotConfig, MessagePoster, RateQuoter};

pub use cost_explorer::CostExplorerClient;
pub use exchange_rate::{AlphaVantageQuoter, ExchangeRateApiQuoter};
pub use http::{HttpError, HttpTransport, ReqwestTransport};
pub use slack::{SlackClient, SlackWebhook};

/// Concrete collaborators for one process, sharing a single transport.
pub struct Providers {
    pub costs: CostExplorerClient,
    pub rates: Option<Box<dyn RateQuoter>>,
    pub chat: SlackClient,
    pub webhook: Option<SlackWebhook>,
}

impl Providers {
    /// Build with the default reqwest transport.
    pub fn from_config(config: &CostbotConfig) -> Result<Self, HttpError> {
        Ok(Self::with_transport(config, Arc::new(ReqwestTransport::new()?)))
    }

    pub fn with_transport(config: &CostbotConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            costs: CostExplorerClient::from_config(Arc::clone(&transport), &config.aws),
            rates: exchange_rate::quoter_from_config(Arc::clone(&transport), &config.rate),
            chat: SlackClient::new(Arc::clone(&transport), config.slack.bot_token.clone()),
            webhook: config
                .slack
                .webhook_url
                .clone()
                .map(|url| SlackWebhook::new(Arc::clone(&transport), url)),
        }
    }

    /// Scheduled and manual reports go through the webhook when one is configured.
    pub fn collaborators(&self) -> Collaborators<'_> {
        let broadcaster: &dyn MessagePoster = match &self.webhook {
            Some(webhook) => webhook,
            None => &self.chat,
        };
        Collaborators {
            costs: &self.costs,
            rates: self.rates.as_deref().map(|q| q as &dyn RateQuoter),
            broadcaster,
            replier: &self.chat,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use costbot_core::Destination;

    use super::*;
    use crate::http::testing::ScriptedTransport;

    fn config(extra: &[(&'static str, &'static str)]) -> CostbotConfig {
        let mut env: HashMap<&str, &str> = HashMap::from([
            ("SLACK_BOT_TOKEN", "xoxb-1"),
            ("SLACK_CHANNEL_ID", "C123"),
            ("SLACK_SIGNING_SECRET", "shh"),
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]);
        env.extend(extra.iter().copied());
        CostbotConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap()
    }

    #[test]
    fn broadcaster_is_webhook_when_configured() {
        let transport = Arc::new(ScriptedTransport::respond(200, "ok"));
        let providers = Providers::with_transport(
            &config(&[("SLACK_WEBHOOK_URL", "https://hooks.slack.com/services/T/B/X")]),
            transport.clone(),
        );
        providers
            .collaborators()
            .broadcaster
            .post(&Destination::channel("C123"), "report")
            .unwrap();
        assert_eq!(
            transport.requests()[0].url,
            "https://hooks.slack.com/services/T/B/X"
        );
    }

    #[test]
    fn broadcaster_falls_back_to_chat_api() {
        let transport = Arc::new(ScriptedTransport::respond(200, r#"{"ok":true}"#));
        let providers = Providers::with_transport(&config(&[]), transport.clone());
        providers
            .collaborators()
            .broadcaster
            .post(&Destination::channel("C123"), "report")
            .unwrap();
        assert_eq!(transport.requests()[0].url, slack::SLACK_POST_MESSAGE_URL);
    }

    #[test]
    fn rate_quoter_follows_key_presence() {
        let transport: Arc<dyn HttpTransport> = Arc::new(ScriptedTransport::default());
        let without = Providers::with_transport(&config(&[]), Arc::clone(&transport));
        assert!(without.collaborators().rates.is_none());

        let with = Providers::with_transport(
            &config(&[
                ("COSTBOT_RATE_PROVIDER", "exchangerate_api"),
                ("EXCHANGE_RATE_API_KEY", "k"),
            ]),
            transport,
        );
        let quoter = with.collaborators().rates.unwrap();
        assert_eq!(quoter.provider(), "exchangerate_api");
    }
}

//! Failure taxonomy shared by every component.

/// Report generation, delivery and startup failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    /// Cost or rate provider unreachable, or its answer was rejected or malformed.
    #[error("upstream unavailable ({provider}): {message}")]
    UpstreamUnavailable { provider: String, message: String },
    /// Outbound push was rejected or could not be sent.
    #[error("delivery to {destination} failed: {message}")]
    DeliveryFailed { destination: String, message: String },
    /// Inbound payload does not match any known trigger shape.
    #[error("unsupported trigger: {0}")]
    UnsupportedTrigger(String),
    /// A required configuration value is absent.
    #[error("missing required configuration: {0}")]
    ConfigurationMissing(String),
    /// A configuration value is present but cannot be used.
    #[error("invalid configuration value for {key}: {message}")]
    InvalidConfiguration { key: String, message: String },
    /// Inbound chat request failed signature verification.
    #[error("unauthorized request: {0}")]
    Unauthorized(String),
}

impl ReportError {
    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn delivery(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            destination: destination.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Stable code for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::UnsupportedTrigger(_) => "unsupported_trigger",
            Self::ConfigurationMissing(_) => "configuration_missing",
            Self::InvalidConfiguration { .. } => "invalid_configuration",
            Self::Unauthorized(_) => "unauthorized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_names_provider() {
        let err = ReportError::upstream("cost_explorer", "status=403 AccessDenied");
        assert_eq!(err.code(), "upstream_unavailable");
        assert_eq!(
            err.to_string(),
            "upstream unavailable (cost_explorer): status=403 AccessDenied"
        );
    }

    #[test]
    fn configuration_missing_names_key() {
        let err = ReportError::ConfigurationMissing("SLACK_CHANNEL_ID".into());
        assert!(err.to_string().contains("SLACK_CHANNEL_ID"));
    }
}

//! Slack request signing (`X-Slack-Signature`, `X-Slack-Request-Timestamp`).

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ReportError;

/// Slack signature version prefix.
pub const SLACK_SIGNATURE_VERSION: &str = "v0";

/// Maximum allowed clock skew for Slack signatures (5 minutes).
pub const SLACK_SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

fn signing_mac(signing_secret: &str, timestamp: i64, body: &[u8]) -> Option<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes()).ok()?;
    mac.update(SLACK_SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b":");
    mac.update(body);
    Some(mac)
}

/// Compute the `v0=<hex>` signature Slack would send for `body`.
pub fn slack_signature(signing_secret: &str, timestamp: i64, body: &[u8]) -> String {
    let digest = signing_mac(signing_secret, timestamp, body)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("{}={}", SLACK_SIGNATURE_VERSION, digest)
}

/// Verify a Slack signature against the raw request body in constant time.
pub fn verify_slack_signature(
    signing_secret: &str,
    timestamp: i64,
    signature: &str,
    body: &[u8],
) -> bool {
    let Some(hex_digest) = signature
        .strip_prefix(SLACK_SIGNATURE_VERSION)
        .and_then(|rest| rest.strip_prefix('='))
    else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    match signing_mac(signing_secret, timestamp, body) {
        Some(mac) => mac.verify_slice(&expected).is_ok(),
        None => false,
    }
}

/// Check headers (lowercase keys) and timestamp freshness for an inbound request.
pub fn verify_request(
    signing_secret: &str,
    headers: &HashMap<String, String>,
    body: &str,
    now_unix: i64,
) -> Result<(), ReportError> {
    let timestamp = headers
        .get(TIMESTAMP_HEADER)
        .ok_or_else(|| ReportError::Unauthorized("missing request timestamp".into()))?
        .trim()
        .parse::<i64>()
        .map_err(|_| ReportError::Unauthorized("malformed request timestamp".into()))?;
    if (now_unix - timestamp).abs() > SLACK_SIGNATURE_TOLERANCE_SECS {
        return Err(ReportError::Unauthorized("stale request timestamp".into()));
    }
    let signature = headers
        .get(SIGNATURE_HEADER)
        .ok_or_else(|| ReportError::Unauthorized("missing request signature".into()))?;
    if verify_slack_signature(signing_secret, timestamp, signature.trim(), body.as_bytes()) {
        Ok(())
    } else {
        Err(ReportError::Unauthorized("signature mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const TS: i64 = 1_531_420_618;

    fn headers(ts: i64, signature: &str) -> HashMap<String, String> {
        HashMap::from([
            (TIMESTAMP_HEADER.to_string(), ts.to_string()),
            (SIGNATURE_HEADER.to_string(), signature.to_string()),
        ])
    }

    #[test]
    fn computed_signature_verifies() {
        let body = br#"{"type":"event_callback"}"#;
        let signature = slack_signature(SECRET, TS, body);
        assert!(signature.starts_with("v0="));
        assert!(verify_slack_signature(SECRET, TS, &signature, body));
    }

    #[test]
    fn tampered_body_or_bad_prefix_is_rejected() {
        let body = br#"{"type":"event_callback"}"#;
        let signature = slack_signature(SECRET, TS, body);
        assert!(!verify_slack_signature(SECRET, TS, &signature, b"{}"));
        assert!(!verify_slack_signature(SECRET, TS, "v0=deadbeef", body));
        assert!(!verify_slack_signature(SECRET, TS, "v1=00", body));
        assert!(!verify_slack_signature(SECRET, TS, "v0=not-hex", body));
    }

    #[test]
    fn request_within_tolerance_passes() {
        let body = "token=x&text=bills";
        let signature = slack_signature(SECRET, TS, body.as_bytes());
        assert!(verify_request(SECRET, &headers(TS, &signature), body, TS + 60).is_ok());
    }

    #[test]
    fn stale_request_is_unauthorized() {
        let body = "{}";
        let signature = slack_signature(SECRET, TS, body.as_bytes());
        let err = verify_request(SECRET, &headers(TS, &signature), body, TS + 301).unwrap_err();
        assert_eq!(err, ReportError::Unauthorized("stale request timestamp".into()));
    }

    #[test]
    fn missing_headers_are_unauthorized() {
        let err = verify_request(SECRET, &HashMap::new(), "{}", TS).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }
}

//! Blocking HTTP seam shared by every provider client.
//! Pass your transport when building a client: `SlackClient::new(Arc::new(your_transport), token)`.

mod reqwest_transport;

use tracing::debug;

pub use reqwest_transport::ReqwestTransport;

/// Error from the transport itself (connect, TLS, body read). Non-2xx statuses are not errors here.
#[derive(Debug, Clone)]
pub struct HttpError(pub String);

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HttpError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value with a case-insensitive name match.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP transport abstraction. Implement and pass to the provider clients.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError>;
}

pub(crate) fn url_host(url: &str) -> Option<&str> {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    without_scheme
        .split(['/', '?'])
        .next()
        .map(str::trim)
        .filter(|host| !host.is_empty())
}

/// Stable log code for a response status.
pub(crate) fn status_code_label(status: u16) -> &'static str {
    match status {
        200..=299 => "http.ok",
        401 => "http.auth.401",
        403 => "http.forbidden.403",
        429 => "http.rate_limited.429",
        500..=599 => "http.server_error.5xx",
        _ => "http.invalid_request",
    }
}

/// Send through `transport`, logging by host only (URLs may carry keys).
pub(crate) fn send_logged(
    transport: &dyn HttpTransport,
    request: &HttpRequest,
    domain: &'static str,
) -> Result<HttpResponse, HttpError> {
    let host = url_host(&request.url).unwrap_or("unknown");
    debug!(
        event = "http.request_attempt",
        domain = domain,
        method = request.method.as_str(),
        url_host = host,
        request_bytes = request.body.as_ref().map(|b| b.len()).unwrap_or(0) as u64
    );
    match transport.send(request) {
        Ok(response) => {
            debug!(
                event = "http.request_completed",
                domain = domain,
                url_host = host,
                status = response.status,
                code = status_code_label(response.status),
                response_bytes = response.body.len() as u64
            );
            Ok(response)
        }
        Err(err) => {
            debug!(
                event = "http.request_failed",
                domain = domain,
                url_host = host,
                code = "http.transport",
                error = %err
            );
            Err(err)
        }
    }
}

/// Trim a response body for inclusion in an error message.
pub(crate) fn snippet(body: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_extracted_without_path_or_query() {
        assert_eq!(
            url_host("https://www.alphavantage.co/query?apikey=secret"),
            Some("www.alphavantage.co")
        );
        assert_eq!(url_host("https://slack.com/api/chat.postMessage"), Some("slack.com"));
        assert_eq!(url_host("https:///"), None);
    }

    #[test]
    fn status_labels_match_families() {
        assert_eq!(status_code_label(204), "http.ok");
        assert_eq!(status_code_label(403), "http.forbidden.403");
        assert_eq!(status_code_label(429), "http.rate_limited.429");
        assert_eq!(status_code_label(503), "http.server_error.5xx");
        assert_eq!(status_code_label(400), "http.invalid_request");
    }

    #[test]
    fn snippet_truncates_long_bodies() {
        let long = "x".repeat(500);
        let short = snippet(&long);
        assert_eq!(short.len(), 203);
        assert!(short.ends_with("..."));
        assert_eq!(snippet("  short  "), "short");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = HttpRequest::get("https://example.test").header("Content-Type", "text/plain");
        assert_eq!(request.header_value("content-type"), Some("text/plain"));
        assert_eq!(request.header_value("authorization"), None);
    }
}

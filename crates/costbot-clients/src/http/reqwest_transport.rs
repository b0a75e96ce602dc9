use super::{HttpError, HttpRequest, HttpResponse, HttpTransport, Method};

const USER_AGENT: &str = "costbot/0.1";

/// Default transport using the reqwest blocking client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HttpError(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let resp = builder.send().map_err(|e| HttpError(e.without_url().to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| HttpError(e.without_url().to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

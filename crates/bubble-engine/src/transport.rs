use std::io::{BufRead, BufReader};
use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::error::GatewayError;

const ERROR_BODY_MAX_CHARS: usize = 512;

pub type Headers = [(String, String)];
pub type EventStreamBody = Box<dyn BufRead + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetch-style HTTP seam used by every provider adapter.
pub trait HttpTransport: Send + Sync {
    /// POST a JSON body and return status plus the full text body.
    fn post(&self, url: &str, headers: &Headers, body: &str) -> Result<HttpReply, GatewayError>;

    /// POST a JSON body and hand back the raw `text/event-stream` body.
    /// Non-success statuses are reported as transport failures.
    fn open_event_stream(
        &self,
        url: &str,
        headers: &Headers,
        body: &str,
    ) -> Result<EventStreamBody, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: HttpClient,
}

impl ReqwestTransport {
    /// `timeout` bounds a whole request; `None` lets streams stay open until
    /// the upstream closes them.
    pub fn new(timeout: Option<Duration>) -> Result<Self, GatewayError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::transport("client", err.to_string()))?;
        Ok(Self { http })
    }

    fn send(
        &self,
        url: &str,
        headers: &Headers,
        body: &str,
        event_stream: bool,
    ) -> Result<reqwest::blocking::Response, GatewayError> {
        let mut request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if event_stream {
            request = request.header(ACCEPT, "text/event-stream");
        }
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
            .send()
            .map_err(|err| GatewayError::transport(url, error_chain_text(&err)))
    }
}

impl HttpTransport for ReqwestTransport {
    fn post(&self, url: &str, headers: &Headers, body: &str) -> Result<HttpReply, GatewayError> {
        let response = self.send(url, headers, body, false)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| GatewayError::transport(url, format!("body read failed: {err}")))?;
        Ok(HttpReply { status, body })
    }

    fn open_event_stream(
        &self,
        url: &str,
        headers: &Headers,
        body: &str,
    ) -> Result<EventStreamBody, GatewayError> {
        let response = self.send(url, headers, body, true)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_failure(url, status.as_u16(), &body));
        }
        Ok(Box::new(BufReader::new(response)))
    }
}

pub(crate) fn status_failure(url: &str, status: u16, body: &str) -> GatewayError {
    GatewayError::TransportFailure {
        url: url.to_string(),
        status: Some(status),
        message: format!(
            "upstream returned {status}: {}",
            truncate_text(body, ERROR_BODY_MAX_CHARS)
        ),
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    parts.join(" | caused by: ")
}

#[cfg(test)]
mod tests {
    use super::{status_failure, truncate_text, HttpReply};
    use crate::error::ErrorKind;

    #[test]
    fn reply_success_covers_2xx_only() {
        let ok = HttpReply {
            status: 204,
            body: String::new(),
        };
        let redirect = HttpReply {
            status: 302,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }

    #[test]
    fn status_failure_truncates_long_bodies() {
        let body = "x".repeat(600);
        let err = status_failure("https://example.test", 503, &body);
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        let text = err.to_string();
        assert!(text.contains("upstream returned 503"));
        assert!(text.ends_with('…'));
        assert_eq!(truncate_text("短文本", 10), "短文本");
    }
}

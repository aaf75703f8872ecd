//! Scripted in-memory transport for exercising adapters without a network.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::GatewayError;
use crate::transport::{EventStreamBody, Headers, HttpReply, HttpTransport};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub streaming: bool,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

/// Replays queued replies in order. Running out of replies is reported as a
/// transport failure.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Result<HttpReply, String>>>,
    streams: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_reply(&self, status: u16, body: &str) {
        self.push_reply(Ok(HttpReply {
            status,
            body: body.to_string(),
        }));
    }

    pub fn queue_json(&self, status: u16, body: &Value) {
        self.queue_reply(status, &body.to_string());
    }

    pub fn queue_failure(&self, message: &str) {
        self.push_reply(Err(message.to_string()));
    }

    /// Queue a stream whose events carry `data` verbatim, one per event.
    pub fn queue_stream<S: AsRef<str>>(&self, data: &[S]) {
        let body: String = data
            .iter()
            .map(|item| format!("data: {}\n\n", item.as_ref()))
            .collect();
        if let Ok(mut streams) = self.streams.lock() {
            streams.push_back(Ok(body));
        }
    }

    pub fn queue_stream_failure(&self, message: &str) {
        if let Ok(mut streams) = self.streams.lock() {
            streams.push_back(Err(message.to_string()));
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn push_reply(&self, reply: Result<HttpReply, String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    fn record(&self, url: &str, headers: &Headers, body: &str, streaming: bool) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                url: url.to_string(),
                headers: headers.to_vec(),
                body: body.to_string(),
                streaming,
            });
        }
    }
}

impl HttpTransport for MockTransport {
    fn post(&self, url: &str, headers: &Headers, body: &str) -> Result<HttpReply, GatewayError> {
        self.record(url, headers, body, false);
        let next = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front());
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(GatewayError::transport(url, message)),
            None => Err(GatewayError::transport(url, "no scripted reply left")),
        }
    }

    fn open_event_stream(
        &self,
        url: &str,
        headers: &Headers,
        body: &str,
    ) -> Result<EventStreamBody, GatewayError> {
        self.record(url, headers, body, true);
        let next = self
            .streams
            .lock()
            .ok()
            .and_then(|mut streams| streams.pop_front());
        match next {
            Some(Ok(raw)) => Ok(Box::new(Cursor::new(raw.into_bytes()))),
            Some(Err(message)) => Err(GatewayError::transport(url, message)),
            None => Err(GatewayError::transport(url, "no scripted stream left")),
        }
    }
}

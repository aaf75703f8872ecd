//! Reassembly of streamed model output into display-safe fragments.
//!
//! Upstream token boundaries can split a markdown horizontal rule (`---`)
//! across several deltas. A delta that ends in an open run of dashes is held
//! back until a delta arrives that does not, so a consumer never renders a
//! half rule as stray `-` characters.

use std::io::BufRead;
use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::Instant;

use bubble_contracts::logs::NetworkLog;

use crate::sse::{SseReader, MAX_EVENT_BYTES};

/// Upper bound on the raw event text one stream may accumulate.
pub const MAX_STREAM_BYTES: usize = 16 * 1024 * 1024;

/// Pulls the incremental text out of one provider stream event.
pub type DeltaExtractor = fn(&str) -> Result<String, String>;

/// True when `delta` ends in a `-` followed only by spaces or tabs, i.e. a
/// run of dashes that no newline has closed yet.
pub fn ends_in_open_rule(delta: &str) -> bool {
    delta
        .trim_end_matches(|c: char| c.is_whitespace() && c != '\n' && c != '\r')
        .ends_with('-')
}

#[derive(Debug, Clone, Default)]
pub struct Reassembler {
    pending: String,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta; returns the fragment to emit, if any. An empty delta
    /// leaves any held-back text where it is.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        if delta.is_empty() {
            return None;
        }
        if ends_in_open_rule(delta) {
            self.pending.push_str(delta);
            return None;
        }
        let mut fragment = std::mem::take(&mut self.pending);
        fragment.push_str(delta);
        (!fragment.is_empty()).then_some(fragment)
    }

    /// Drain whatever is still held back at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        (!rest.is_empty()).then_some(rest)
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }
}

/// Why a fragment stream stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The upstream sent its termination sentinel.
    Sentinel,
    /// The connection closed.
    Closed,
    /// An unreadable event, a read error, or the buffer limit was hit;
    /// nothing after it is consumed.
    Failed(String),
}

struct StreamLog {
    sink: Arc<dyn NetworkLog>,
    url: String,
    request_body: String,
    started: Instant,
}

/// Single-pass, forward-only sequence of display-safe text fragments.
///
/// Ends at the sentinel, on connection close, or at the first event whose
/// delta cannot be extracted. Held-back text is emitted as a final fragment
/// in every case. The raw event payloads are written to the network log once
/// the stream ends or is dropped.
pub struct FragmentStream {
    events: SseReader<Box<dyn BufRead + Send>>,
    extract: DeltaExtractor,
    sentinel: Option<&'static str>,
    reassembler: Reassembler,
    raw_events: Vec<String>,
    raw_bytes: usize,
    max_bytes: usize,
    end: Option<StreamEnd>,
    drained: bool,
    log: Option<StreamLog>,
}

impl FragmentStream {
    pub fn new(
        body: Box<dyn BufRead + Send>,
        extract: DeltaExtractor,
        sentinel: Option<&'static str>,
    ) -> Self {
        Self {
            events: SseReader::new(body),
            extract,
            sentinel,
            reassembler: Reassembler::new(),
            raw_events: Vec::new(),
            raw_bytes: 0,
            max_bytes: MAX_STREAM_BYTES,
            end: None,
            drained: false,
            log: None,
        }
    }

    pub(crate) fn with_network_log(
        mut self,
        sink: Arc<dyn NetworkLog>,
        url: &str,
        request_body: String,
        started: Instant,
    ) -> Self {
        self.log = Some(StreamLog {
            sink,
            url: url.to_string(),
            request_body,
            started,
        });
        self
    }

    /// Cap both a single event and the raw text kept for the network log.
    pub fn with_buffer_limit(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes.max(1);
        self.events.set_max_event_bytes(self.max_bytes.min(MAX_EVENT_BYTES));
        self
    }

    /// Set once the stream stopped consuming upstream events.
    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    fn terminate(&mut self, end: StreamEnd) {
        if let StreamEnd::Failed(reason) = &end {
            tracing::warn!(reason = %reason, "model stream ended early");
        }
        self.end = Some(end);
        self.write_log();
    }

    fn write_log(&mut self) {
        if let Some(log) = self.log.take() {
            let elapsed_ms = log.started.elapsed().as_millis() as u64;
            log.sink.log_network(
                &log.url,
                &log.request_body,
                &self.raw_events.join("\n"),
                elapsed_ms,
            );
        }
    }
}

impl Iterator for FragmentStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if self.end.is_some() {
                if self.drained {
                    return None;
                }
                self.drained = true;
                return self.reassembler.finish();
            }
            match self.events.next() {
                None => self.terminate(StreamEnd::Closed),
                Some(Err(err)) => self.terminate(StreamEnd::Failed(err.to_string())),
                Some(Ok(event)) => {
                    self.raw_bytes += event.data.len();
                    if self.raw_bytes > self.max_bytes {
                        let reason = format!("stream buffer exceeded {} bytes", self.max_bytes);
                        self.terminate(StreamEnd::Failed(reason));
                        continue;
                    }
                    self.raw_events.push(event.data.clone());
                    if self.sentinel == Some(event.data.as_str()) {
                        self.terminate(StreamEnd::Sentinel);
                        continue;
                    }
                    match (self.extract)(&event.data) {
                        Ok(delta) => {
                            if let Some(fragment) = self.reassembler.push(&delta) {
                                return Some(fragment);
                            }
                        }
                        Err(reason) => self.terminate(StreamEnd::Failed(reason)),
                    }
                }
            }
        }
    }
}

impl FusedIterator for FragmentStream {}

impl Drop for FragmentStream {
    fn drop(&mut self) {
        self.write_log();
    }
}

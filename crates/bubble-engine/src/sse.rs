//! Minimal `text/event-stream` decoder over a blocking reader.

use std::io::{self, BufRead, Read};

/// Largest single event, field lines included, before the stream is aborted.
pub const MAX_EVENT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

/// Pulls one dispatched event at a time. Comment lines and events without
/// any `data:` field are skipped; a trailing event without the closing
/// blank line is still dispatched at end of input. An event larger than the
/// byte limit is an `InvalidData` error that ends the stream.
pub struct SseReader<R> {
    reader: R,
    line: String,
    done: bool,
    max_event_bytes: usize,
}

impl<R: BufRead> SseReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            done: false,
            max_event_bytes: MAX_EVENT_BYTES,
        }
    }

    pub fn set_max_event_bytes(&mut self, max_event_bytes: usize) {
        self.max_event_bytes = max_event_bytes.max(1);
    }
}

impl<R: BufRead> Iterator for SseReader<R> {
    type Item = io::Result<SseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut event = SseEvent::default();
        let mut data_lines: Vec<String> = Vec::new();
        let mut event_bytes = 0usize;
        loop {
            self.line.clear();
            let budget = self.max_event_bytes.saturating_sub(event_bytes);
            let read = (&mut self.reader)
                .take(budget as u64 + 1)
                .read_line(&mut self.line);
            let n = match read {
                Ok(n) => n,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            if n == 0 {
                self.done = true;
                if data_lines.is_empty() {
                    return None;
                }
                break;
            }
            if n > budget {
                self.done = true;
                self.line.clear();
                return Some(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("stream buffer exceeded {} bytes", self.max_event_bytes),
                )));
            }
            event_bytes += n;

            let line = self.line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if data_lines.is_empty() {
                    event = SseEvent::default();
                    event_bytes = 0;
                    continue;
                }
                break;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "data" => data_lines.push(value.to_string()),
                "event" => event.event = Some(value.to_string()),
                "id" => event.id = Some(value.to_string()),
                _ => {}
            }
        }
        event.data = data_lines.join("\n");
        Some(Ok(event))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{SseEvent, SseReader};

    fn events(raw: &str) -> Vec<SseEvent> {
        SseReader::new(Cursor::new(raw.as_bytes().to_vec()))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or_default()
    }

    #[test]
    fn splits_events_on_blank_lines() {
        let parsed = events("data: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].data, "{\"a\":1}");
        assert_eq!(parsed[1].data, "[DONE]");
    }

    #[test]
    fn joins_multiline_data_and_keeps_event_fields() {
        let parsed = events("event: delta\r\nid: 7\r\ndata: one\r\ndata:two\r\n\r\n");
        assert_eq!(
            parsed,
            vec![SseEvent {
                event: Some("delta".to_string()),
                id: Some("7".to_string()),
                data: "one\ntwo".to_string(),
            }]
        );
    }

    #[test]
    fn skips_comments_and_dataless_events() {
        let parsed = events(": keep-alive\n\nevent: ping\n\ndata: x\n\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].data, "x");
        assert_eq!(parsed[0].event, None);
    }

    #[test]
    fn dispatches_unterminated_trailing_event() {
        let parsed = events("data: first\n\ndata: tail");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].data, "tail");
        assert!(events("").is_empty());
    }

    #[test]
    fn oversized_event_is_an_error_that_ends_the_stream() {
        let raw = format!("data: ok\n\ndata: {}\n\ndata: late\n\n", "x".repeat(40));
        let mut reader = SseReader::new(Cursor::new(raw.into_bytes()));
        reader.set_max_event_bytes(16);
        let first = reader.next().and_then(Result::ok).map(|event| event.data);
        assert_eq!(first.as_deref(), Some("ok"));
        let err = reader.next().and_then(Result::err).map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("stream buffer exceeded 16 bytes"));
        assert!(reader.next().is_none());
    }
}

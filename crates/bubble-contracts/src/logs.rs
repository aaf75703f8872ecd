use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::events::{EventPayload, EventWriter};

pub const NETWORK_EVENT: &str = "network";
pub const GAME_EVENT: &str = "game_record";
pub const RECENT_GAMES_LIMIT: usize = 50;

/// Sink for upstream request/response pairs.
///
/// Logging is fire-and-forget: implementations must never fail the call
/// that produced the record.
pub trait NetworkLog: Send + Sync {
    fn log_network(&self, url: &str, request_body: &str, response_body: &str, elapsed_ms: u64);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub url: String,
    pub payload: String,
    pub response: String,
    pub time: u64,
}

impl NetworkLog for EventWriter {
    fn log_network(&self, url: &str, request_body: &str, response_body: &str, elapsed_ms: u64) {
        let payload = map_object(json!({
            "url": url,
            "payload": request_body,
            "response": response_body,
            "time": elapsed_ms,
        }));
        if let Err(err) = self.emit(NETWORK_EVENT, payload) {
            tracing::warn!(
                path = %self.path().display(),
                error = %err,
                "network log write failed"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullNetworkLog;

impl NetworkLog for NullNetworkLog {
    fn log_network(&self, _url: &str, _request_body: &str, _response_body: &str, _elapsed_ms: u64) {
    }
}

/// Keeps every record in memory; handy for asserting on what was sent.
#[derive(Debug, Default)]
pub struct MemoryNetworkLog {
    records: Mutex<Vec<NetworkRecord>>,
}

impl MemoryNetworkLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<NetworkRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl NetworkLog for MemoryNetworkLog {
    fn log_network(&self, url: &str, request_body: &str, response_body: &str, elapsed_ms: u64) {
        if let Ok(mut records) = self.records.lock() {
            records.push(NetworkRecord {
                url: url.to_string(),
                payload: request_body.to_string(),
                response: response_body.to_string(),
                time: elapsed_ms,
            });
        }
    }
}

/// Outcome of one round of the drawing game, as reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameOutcome {
    pub target: String,
    pub language: String,
    pub hints: String,
    pub recognized: String,
    pub bingo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub target: String,
    pub language: String,
    pub hints: String,
    pub recognized: String,
    pub bingo: bool,
    pub image_sha256: String,
    pub image_bytes: u64,
    #[serde(default)]
    pub ts: String,
}

/// Game history on top of the shared event log.
#[derive(Debug, Clone)]
pub struct GameLog {
    events: EventWriter,
}

impl GameLog {
    pub fn new(events: EventWriter) -> Self {
        Self { events }
    }

    pub fn record(&self, outcome: &GameOutcome, image: &[u8]) -> anyhow::Result<GameRecord> {
        let mut hasher = Sha256::new();
        hasher.update(image);
        let payload = map_object(json!({
            "target": outcome.target,
            "language": outcome.language,
            "hints": outcome.hints,
            "recognized": outcome.recognized,
            "bingo": outcome.bingo,
            "image_sha256": hex::encode(hasher.finalize()),
            "image_bytes": image.len() as u64,
        }));
        let emitted = self.events.emit(GAME_EVENT, payload)?;
        Ok(serde_json::from_value(emitted)?)
    }

    /// Most recent games first.
    pub fn recent_games(&self, limit: usize) -> anyhow::Result<Vec<GameRecord>> {
        self.recent(limit, |_| true)
    }

    /// Most recent bingo games first.
    pub fn recent_successful_games(&self, limit: usize) -> anyhow::Result<Vec<GameRecord>> {
        self.recent(limit, |record| record.bingo)
    }

    fn recent(
        &self,
        limit: usize,
        keep: impl Fn(&GameRecord) -> bool,
    ) -> anyhow::Result<Vec<GameRecord>> {
        let rows = self.events.read(GAME_EVENT)?;
        Ok(rows
            .into_iter()
            .rev()
            .filter_map(|row| serde_json::from_value::<GameRecord>(Value::Object(row)).ok())
            .filter(|record| keep(record))
            .take(limit)
            .collect())
    }
}

fn map_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(target: &str, recognized: &str, bingo: bool) -> GameOutcome {
        GameOutcome {
            target: target.to_string(),
            language: "zh".to_string(),
            hints: String::new(),
            recognized: recognized.to_string(),
            bingo,
        }
    }

    #[test]
    fn event_writer_logs_network_records() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-1");
        writer.log_network("https://example.test/chat", "{\"a\":1}", "{\"b\":2}", 42);

        let rows = writer.read(NETWORK_EVENT)?;
        assert_eq!(rows.len(), 1);
        let record: NetworkRecord = serde_json::from_value(Value::Object(rows[0].clone()))?;
        assert_eq!(
            record,
            NetworkRecord {
                url: "https://example.test/chat".to_string(),
                payload: "{\"a\":1}".to_string(),
                response: "{\"b\":2}".to_string(),
                time: 42,
            }
        );
        Ok(())
    }

    #[test]
    fn network_log_failure_does_not_panic() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        // A directory where the log file should be makes every write fail.
        let writer = EventWriter::new(temp.path(), "session-1");
        writer.log_network("https://example.test", "", "", 1);
        Ok(())
    }

    #[test]
    fn memory_log_retains_records_in_order() {
        let log = MemoryNetworkLog::new();
        log.log_network("a", "1", "x", 1);
        log.log_network("b", "2", "y", 2);
        let urls: Vec<String> = log.records().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["a", "b"]);
    }

    #[test]
    fn game_log_records_digest_and_reads_newest_first() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = GameLog::new(EventWriter::new(temp.path().join("events.jsonl"), "s"));

        let first = log.record(&outcome("月亮", "月亮", true), b"image-1")?;
        log.record(&outcome("鱼", "猫", false), b"image-2")?;
        log.record(&outcome("树", "树", true), b"image-3")?;
        log.events.log_network("https://example.test", "", "", 3);

        assert_eq!(first.image_bytes, 7);
        assert_eq!(first.image_sha256.len(), 64);
        assert!(!first.ts.is_empty());

        let recent = log.recent_games(RECENT_GAMES_LIMIT)?;
        let targets: Vec<&str> = recent.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["树", "鱼", "月亮"]);

        let wins = log.recent_successful_games(1)?;
        assert_eq!(wins.len(), 1);
        assert_eq!(wins[0].target, "树");
        Ok(())
    }
}

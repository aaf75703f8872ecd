//! Google Generative Language `generateContent`.

use std::sync::Arc;

use bubble_contracts::logs::NetworkLog;
use bubble_contracts::messages::{Message, Part, Role};
use serde_json::{json, Map, Value};

use crate::error::GatewayError;
use crate::provider::{ProviderConfig, ProviderResponse, Upstream, VisionProvider};
use crate::stream::FragmentStream;
use crate::transport::HttpTransport;

pub const PROVIDER_NAME: &str = "gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    config: ProviderConfig,
    upstream: Upstream,
}

impl GeminiProvider {
    pub fn new(
        config: ProviderConfig,
        transport: Arc<dyn HttpTransport>,
        log: Arc<dyn NetworkLog>,
    ) -> Self {
        Self {
            config,
            upstream: Upstream::new(transport, log),
        }
    }

    /// System turns collapse into `systemInstruction`; only user turns become
    /// `contents`.
    pub fn build_payload(&self, messages: &[Message]) -> Value {
        let mut payload = Map::new();

        let system_text = messages
            .iter()
            .filter(|message| message.role == Role::System)
            .map(Message::text)
            .collect::<Vec<String>>()
            .join("\n");
        if !system_text.is_empty() {
            payload.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": system_text }] }),
            );
        }

        let contents: Vec<Value> = messages
            .iter()
            .filter(|message| message.role == Role::User)
            .map(|message| {
                let parts: Vec<Value> = message
                    .content
                    .iter()
                    .map(|part| match part {
                        Part::Text(text) => json!({ "text": text }),
                        Part::Image(image) => json!({
                            "inlineData": {
                                "mimeType": image.mime_type,
                                "data": image.base64(),
                            }
                        }),
                    })
                    .collect();
                json!({ "role": "user", "parts": parts })
            })
            .collect();
        payload.insert("contents".to_string(), Value::Array(contents));

        let mut generation_config = Map::new();
        generation_config.insert("temperature".to_string(), json!(self.config.temperature));
        if let Some(max_tokens) = self.config.max_output_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        payload.insert(
            "generationConfig".to_string(),
            Value::Object(generation_config),
        );
        Value::Object(payload)
    }

    pub fn stream_endpoint(&self) -> String {
        let endpoint = self.config.endpoint.as_str();
        match endpoint.strip_suffix(":generateContent") {
            Some(base) => format!("{base}:streamGenerateContent?alt=sse"),
            None => endpoint.to_string(),
        }
    }

    fn headers(&self) -> Result<Vec<(String, String)>, GatewayError> {
        let api_key = self.config.credential.resolve()?;
        Ok(vec![(API_KEY_HEADER.to_string(), api_key)])
    }
}

impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn complete(&self, messages: &[Message]) -> Result<ProviderResponse, GatewayError> {
        let headers = self.headers()?;
        let payload = self.build_payload(messages);
        let raw = self
            .upstream
            .post_json(PROVIDER_NAME, &self.config.endpoint, &headers, &payload)?;
        let text = extract_candidate_text(&raw)
            .map_err(|message| GatewayError::schema(PROVIDER_NAME, message))?;
        Ok(ProviderResponse { raw, text })
    }

    fn complete_stream(&self, messages: &[Message]) -> Result<FragmentStream, GatewayError> {
        let headers = self.headers()?;
        let payload = self.build_payload(messages);
        self.upstream.open_stream(
            &self.stream_endpoint(),
            &headers,
            &payload,
            extract_candidate_delta,
            None,
        )
    }
}

fn candidate_parts_text(payload: &Value) -> Result<String, String> {
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .ok_or("missing candidates array")?;
    if candidates.len() != 1 {
        return Err(format!(
            "expected exactly one candidate, got {}",
            candidates.len()
        ));
    }
    let candidate = &candidates[0];
    let Some(content) = candidate.get("content") else {
        // Stream chunks that only close the turn carry a finish reason.
        if candidate.get("finishReason").is_some() {
            return Ok(String::new());
        }
        return Err("candidate has no content".to_string());
    };
    let parts = content
        .get("parts")
        .and_then(Value::as_array)
        .ok_or("candidate content parts is not a sequence")?;
    Ok(parts
        .iter()
        .map(|part| part.get("text").and_then(Value::as_str).unwrap_or_default())
        .collect())
}

/// Concatenated text parts of the single candidate.
pub fn extract_candidate_text(payload: &Value) -> Result<String, String> {
    let text = candidate_parts_text(payload)?;
    if text.trim().is_empty() {
        return Err("candidate text is empty".to_string());
    }
    Ok(text)
}

pub fn extract_candidate_delta(data: &str) -> Result<String, String> {
    let chunk: Value =
        serde_json::from_str(data).map_err(|err| format!("stream event is not JSON: {err}"))?;
    candidate_parts_text(&chunk)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bubble_contracts::logs::MemoryNetworkLog;
    use bubble_contracts::messages::{InlineImage, Message, Part};
    use serde_json::json;

    use super::{extract_candidate_delta, extract_candidate_text, GeminiProvider};
    use crate::credentials::CredentialResolver;
    use crate::error::ErrorKind;
    use crate::mock::MockTransport;
    use crate::provider::{ProviderConfig, VisionProvider};

    fn provider(transport: Arc<MockTransport>, log: Arc<MemoryNetworkLog>) -> GeminiProvider {
        GeminiProvider::new(
            ProviderConfig {
                endpoint: "https://gl.test/v1beta/models/gemini-2.0-flash:generateContent"
                    .to_string(),
                model: "gemini-2.0-flash".to_string(),
                temperature: 1.0,
                max_output_tokens: Some(256),
                credential: CredentialResolver::fixed("g-key"),
                bare_base64_images: false,
            },
            transport,
            log,
        )
    }

    fn messages() -> Vec<Message> {
        vec![
            Message::system("You are a judge."),
            Message::system("Answer briefly."),
            Message::user(vec![
                Part::text("Guess:"),
                Part::Image(InlineImage::new("image/jpeg", vec![0xff, 0xd8])),
            ]),
            Message::assistant("ignored"),
        ]
    }

    #[test]
    fn payload_folds_system_turns_and_inlines_images() {
        let adapter = provider(
            Arc::new(MockTransport::new()),
            Arc::new(MemoryNetworkLog::new()),
        );
        let payload = adapter.build_payload(&messages());
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            "You are a judge.\nAnswer briefly."
        );
        let contents = payload["contents"].as_array().cloned().unwrap_or_default();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Guess:");
        assert_eq!(contents[0]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(contents[0]["parts"][1]["inlineData"]["data"], "/9g=");
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn payload_without_system_turns_has_no_instruction() {
        let adapter = provider(
            Arc::new(MockTransport::new()),
            Arc::new(MemoryNetworkLog::new()),
        );
        let payload = adapter.build_payload(&[Message::user(vec![Part::text("hi")])]);
        assert!(payload.get("systemInstruction").is_none());
    }

    #[test]
    fn candidate_text_concatenates_parts_in_order() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "I see " }, { "inlineData": {} }, { "text": "**fish**" }] }
            }]
        });
        assert_eq!(
            extract_candidate_text(&payload).ok(),
            Some("I see **fish**".to_string())
        );
    }

    #[test]
    fn candidate_text_rejects_bad_shapes() {
        let non_sequence = json!({ "candidates": [{ "content": { "parts": { "text": "x" } } }] });
        assert!(extract_candidate_text(&non_sequence).is_err());
        let two = json!({ "candidates": [
            { "content": { "parts": [{ "text": "a" }] } },
            { "content": { "parts": [{ "text": "b" }] } }
        ] });
        assert!(extract_candidate_text(&two).is_err());
        let empty = json!({ "candidates": [{ "content": { "parts": [{ "inlineData": {} }] } }] });
        assert!(extract_candidate_text(&empty).is_err());
        assert!(extract_candidate_text(&json!({ "promptFeedback": {} })).is_err());
    }

    #[test]
    fn complete_uses_header_key_and_logs_exchange() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_json(
            200,
            &json!({ "candidates": [{ "content": { "parts": [{ "text": "**Moon**" }] } }] }),
        );
        transport.queue_json(200, &json!({ "candidates": [{ "content": { "parts": "x" } }] }));
        let log = Arc::new(MemoryNetworkLog::new());
        let adapter = provider(transport.clone(), log.clone());

        let text = adapter.complete(&messages()).ok().map(|res| res.text);
        assert_eq!(text, Some("**Moon**".to_string()));
        let mismatch = adapter.complete(&messages()).err().map(|err| err.kind());
        assert_eq!(mismatch, Some(ErrorKind::SchemaMismatch));

        let requests = transport.requests();
        assert!(requests[0]
            .headers
            .iter()
            .any(|(name, value)| name == "x-goog-api-key" && value == "g-key"));
        assert!(!requests[0].url.contains("g-key"));
        assert_eq!(log.records().len(), 2);
    }

    #[test]
    fn streaming_hits_sse_endpoint_and_ends_on_close() {
        let transport = Arc::new(MockTransport::new());
        let chunk = |text: &str| {
            json!({ "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }] })
                .to_string()
        };
        transport.queue_stream(&[
            chunk("**Fi"),
            chunk("sh** --"),
            json!({ "candidates": [{ "finishReason": "STOP" }] }).to_string(),
        ]);
        let log = Arc::new(MemoryNetworkLog::new());
        let adapter = provider(transport.clone(), log.clone());
        let fragments: Vec<String> = adapter
            .complete_stream(&messages())
            .map(|stream| stream.collect())
            .unwrap_or_default();
        assert_eq!(fragments, vec!["**Fi", "sh** --"]);
        assert_eq!(
            transport.requests()[0].url,
            "https://gl.test/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(log.records().len(), 1);
    }

    #[test]
    fn delta_for_finish_only_chunk_is_empty() {
        assert_eq!(
            extract_candidate_delta(r#"{"candidates":[{"finishReason":"STOP"}]}"#).ok(),
            Some(String::new())
        );
        assert!(extract_candidate_delta("not json").is_err());
    }
}

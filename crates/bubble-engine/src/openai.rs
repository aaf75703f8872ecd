//! OpenAI-compatible chat completions (OpenAI, Zhipu GLM).

use std::sync::Arc;

use bubble_contracts::logs::NetworkLog;
use bubble_contracts::messages::{Message, Part};
use serde_json::{json, Map, Value};

use crate::error::GatewayError;
use crate::provider::{ProviderConfig, ProviderResponse, Upstream, VisionProvider};
use crate::stream::FragmentStream;
use crate::transport::HttpTransport;

pub const PROVIDER_NAME: &str = "openai_chat";
pub const DONE_SENTINEL: &str = "[DONE]";

pub struct OpenAiChatProvider {
    config: ProviderConfig,
    upstream: Upstream,
}

impl OpenAiChatProvider {
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

    pub fn build_payload(&self, messages: &[Message], streaming: bool) -> Value {
        let mut payload = Map::new();
        payload.insert("model".to_string(), Value::String(self.config.model.clone()));
        payload.insert(
            "messages".to_string(),
            Value::Array(
                messages
                    .iter()
                    .map(|message| self.message_json(message))
                    .collect(),
            ),
        );
        payload.insert("temperature".to_string(), json!(self.config.temperature));
        if let Some(max_tokens) = self.config.max_output_tokens {
            payload.insert("max_tokens".to_string(), json!(max_tokens));
        }
        if streaming {
            payload.insert("stream".to_string(), Value::Bool(true));
        }
        Value::Object(payload)
    }

    fn message_json(&self, message: &Message) -> Value {
        let parts: Vec<Value> = message
            .content
            .iter()
            .map(|part| match part {
                Part::Text(text) => json!({ "type": "text", "text": text }),
                Part::Image(image) => {
                    let url = if self.config.bare_base64_images {
                        image.base64()
                    } else {
                        image.data_url()
                    };
                    json!({ "type": "image_url", "image_url": { "url": url } })
                }
            })
            .collect();
        json!({ "role": message.role.as_str(), "content": parts })
    }

    fn headers(&self) -> Result<Vec<(String, String)>, GatewayError> {
        let api_key = self.config.credential.resolve()?;
        Ok(vec![(
            "Authorization".to_string(),
            format!("Bearer {api_key}"),
        )])
    }
}

impl VisionProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn complete(&self, messages: &[Message]) -> Result<ProviderResponse, GatewayError> {
        let headers = self.headers()?;
        let payload = self.build_payload(messages, false);
        let raw = self
            .upstream
            .post_json(PROVIDER_NAME, &self.config.endpoint, &headers, &payload)?;
        let text =
            extract_chat_text(&raw).map_err(|message| GatewayError::schema(PROVIDER_NAME, message))?;
        Ok(ProviderResponse { raw, text })
    }

    fn complete_stream(&self, messages: &[Message]) -> Result<FragmentStream, GatewayError> {
        let headers = self.headers()?;
        let payload = self.build_payload(messages, true);
        self.upstream.open_stream(
            &self.config.endpoint,
            &headers,
            &payload,
            extract_chat_delta,
            Some(DONE_SENTINEL),
        )
    }
}

/// Text of the single assistant choice in a chat completion.
pub fn extract_chat_text(payload: &Value) -> Result<String, String> {
    let choices = payload
        .get("choices")
        .and_then(Value::as_array)
        .ok_or("missing choices array")?;
    if choices.len() != 1 {
        return Err(format!("expected exactly one choice, got {}", choices.len()));
    }
    let message = choices[0]
        .get("message")
        .and_then(Value::as_object)
        .ok_or("choice has no message object")?;
    match message.get("role").and_then(Value::as_str) {
        Some("assistant") => {}
        Some(role) => return Err(format!("choice role is '{role}', not 'assistant'")),
        None => return Err("choice message has no role".to_string()),
    }
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .ok_or("choice content is not a string")?;
    if content.trim().is_empty() {
        return Err("choice content is empty".to_string());
    }
    Ok(content.to_string())
}

/// Incremental text of one `chat.completion.chunk` event. Chunks that only
/// carry a role or a finish reason yield an empty delta.
pub fn extract_chat_delta(data: &str) -> Result<String, String> {
    let chunk: Value =
        serde_json::from_str(data).map_err(|err| format!("stream event is not JSON: {err}"))?;
    let delta = chunk
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(Value::as_object)
        .ok_or("stream event has no choices[0].delta")?;
    match delta.get("content") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(format!("delta content is not a string: {other}")),
    }
}

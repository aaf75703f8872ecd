use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use bubble_contracts::logs::NetworkLog;
use bubble_contracts::messages::Message;
use bubble_contracts::models::{ModelRegistry, ModelSpec, WireFamily};
use serde_json::Value;

use crate::credentials::CredentialResolver;
use crate::error::GatewayError;
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiChatProvider;
use crate::stream::{DeltaExtractor, FragmentStream};
use crate::transport::{status_failure, truncate_text, Headers, HttpTransport};

/// Fixed per-adapter configuration, resolved once when the adapter is built.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: Option<u32>,
    pub credential: CredentialResolver,
    /// Send inline images as bare base64 instead of a `data:` URL.
    pub bare_base64_images: bool,
}

impl ProviderConfig {
    pub fn from_spec(spec: &ModelSpec) -> Self {
        Self {
            endpoint: spec.endpoint(),
            model: spec.name.clone(),
            temperature: spec.temperature,
            max_output_tokens: spec.max_output_tokens,
            credential: CredentialResolver::env_or_prompt(
                &spec.credential_env,
                &spec.credential_label,
            ),
            bare_base64_images: spec.bare_base64_images,
        }
    }

    pub fn with_credential(mut self, credential: CredentialResolver) -> Self {
        self.credential = credential;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Upstream payload as received; kept for logging only.
    pub raw: Value,
    /// Never empty.
    pub text: String,
}

pub enum Completion {
    Single(ProviderResponse),
    Stream(FragmentStream),
}

pub trait VisionProvider: Send + Sync {
    /// Wire family name, used in error messages.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    fn complete(&self, messages: &[Message]) -> Result<ProviderResponse, GatewayError>;

    fn complete_stream(&self, messages: &[Message]) -> Result<FragmentStream, GatewayError>;

    fn request(&self, messages: &[Message], streaming: bool) -> Result<Completion, GatewayError> {
        if streaming {
            self.complete_stream(messages).map(Completion::Stream)
        } else {
            self.complete(messages).map(Completion::Single)
        }
    }
}

/// Adapters keyed by model name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Box<dyn VisionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_models(
        models: &ModelRegistry,
        transport: Arc<dyn HttpTransport>,
        log: Arc<dyn NetworkLog>,
    ) -> Self {
        let mut providers = Self::new();
        for spec in models.list() {
            providers.register(build_provider(spec, transport.clone(), log.clone()));
        }
        providers
    }

    pub fn register(&mut self, provider: Box<dyn VisionProvider>) {
        self.providers.insert(provider.model().to_string(), provider);
    }

    pub fn get(&self, model: &str) -> Option<&dyn VisionProvider> {
        self.providers.get(model).map(|provider| provider.as_ref())
    }

    pub fn take(&mut self, model: &str) -> Option<Box<dyn VisionProvider>> {
        self.providers.remove(model)
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn build_provider(
    spec: &ModelSpec,
    transport: Arc<dyn HttpTransport>,
    log: Arc<dyn NetworkLog>,
) -> Box<dyn VisionProvider> {
    let config = ProviderConfig::from_spec(spec);
    match spec.family {
        WireFamily::OpenAiChat => Box::new(OpenAiChatProvider::new(config, transport, log)),
        WireFamily::Gemini => Box::new(GeminiProvider::new(config, transport, log)),
    }
}

/// HTTP plus network logging, shared by the concrete adapters.
#[derive(Clone)]
pub(crate) struct Upstream {
    transport: Arc<dyn HttpTransport>,
    log: Arc<dyn NetworkLog>,
}

impl Upstream {
    pub(crate) fn new(transport: Arc<dyn HttpTransport>, log: Arc<dyn NetworkLog>) -> Self {
        Self { transport, log }
    }

    /// POST `payload` and decode the JSON reply. The exchange is logged
    /// whatever the outcome.
    pub(crate) fn post_json(
        &self,
        provider: &str,
        url: &str,
        headers: &Headers,
        payload: &Value,
    ) -> Result<Value, GatewayError> {
        let body = payload.to_string();
        let started = Instant::now();
        let result = self.transport.post(url, headers, &body);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                self.log.log_network(url, &body, &err.to_string(), elapsed_ms);
                return Err(err);
            }
        };
        self.log.log_network(url, &body, &reply.body, elapsed_ms);
        tracing::debug!(url, status = reply.status, elapsed_ms, "upstream call finished");

        if !reply.is_success() {
            return Err(status_failure(url, reply.status, &reply.body));
        }
        serde_json::from_str(&reply.body).map_err(|err| {
            GatewayError::schema(
                provider,
                format!(
                    "body is not JSON ({err}): {}",
                    truncate_text(&reply.body, 200)
                ),
            )
        })
    }

    pub(crate) fn open_stream(
        &self,
        url: &str,
        headers: &Headers,
        payload: &Value,
        extract: DeltaExtractor,
        sentinel: Option<&'static str>,
    ) -> Result<FragmentStream, GatewayError> {
        let body = payload.to_string();
        let started = Instant::now();
        match self.transport.open_event_stream(url, headers, &body) {
            Ok(events) => Ok(FragmentStream::new(events, extract, sentinel).with_network_log(
                self.log.clone(),
                url,
                body,
                started,
            )),
            Err(err) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.log.log_network(url, &body, &err.to_string(), elapsed_ms);
                Err(err)
            }
        }
    }
}

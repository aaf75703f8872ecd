use std::env;

use indexmap::IndexMap;

pub const CAPABILITY_VISION: &str = "vision";
pub const CAPABILITY_STREAM: &str = "stream";

/// Upstream wire schema a model is spoken to with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFamily {
    /// `POST {base}/chat/completions` with `choices[].message` replies.
    OpenAiChat,
    /// `POST {base}/models/{model}:generateContent` with `candidates[]` replies.
    Gemini,
}

impl WireFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFamily::OpenAiChat => "openai_chat",
            WireFamily::Gemini => "gemini",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai_chat" | "zhipu" => Some(WireFamily::OpenAiChat),
            "gemini" | "google" => Some(WireFamily::Gemini),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub family: WireFamily,
    pub api_base: String,
    pub capabilities: Vec<String>,
    pub temperature: f64,
    pub max_output_tokens: Option<u32>,
    pub credential_env: Vec<String>,
    pub credential_label: String,
    /// Send inline images as bare base64 instead of a `data:` URL.
    pub bare_base64_images: bool,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }

    pub fn endpoint(&self) -> String {
        let base = self.api_base.trim().trim_end_matches('/');
        match self.family {
            WireFamily::OpenAiChat => format!("{base}/chat/completions"),
            WireFamily::Gemini => {
                let trimmed = self.name.trim();
                let model_path = if trimmed.starts_with("models/") {
                    trimmed.to_string()
                } else {
                    format!("models/{trimmed}")
                };
                format!("{base}/{model_path}:generateContent")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn api_base_from_env(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let zhipu_base = api_base_from_env("ZHIPU_API_BASE", "https://open.bigmodel.cn/api/paas/v4");
    let openai_base = api_base_from_env("OPENAI_API_BASE", "https://api.openai.com/v1");
    let gemini_base = api_base_from_env(
        "GEMINI_API_BASE",
        "https://generativelanguage.googleapis.com/v1beta",
    );

    let mut map = IndexMap::new();
    let mut insert = |name: &str,
                      family: WireFamily,
                      api_base: &str,
                      max_output_tokens: Option<u32>,
                      credential_env: &[&str],
                      credential_label: &str,
                      bare_base64_images: bool| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                family,
                api_base: api_base.to_string(),
                capabilities: vec![
                    CAPABILITY_VISION.to_string(),
                    CAPABILITY_STREAM.to_string(),
                ],
                temperature: 1.0,
                max_output_tokens,
                credential_env: credential_env
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                credential_label: credential_label.to_string(),
                bare_base64_images,
            },
        );
    };

    // GLM-4V rejects `max_tokens`, so the Zhipu models leave it unset.
    insert(
        "glm-4v-plus-0111",
        WireFamily::OpenAiChat,
        zhipu_base.as_str(),
        None,
        &["API_KEY_ZHIPU"],
        "Zhipu",
        true,
    );
    insert(
        "glm-4v-flash",
        WireFamily::OpenAiChat,
        zhipu_base.as_str(),
        None,
        &["API_KEY_ZHIPU"],
        "Zhipu",
        true,
    );
    insert(
        "gpt-4o-mini",
        WireFamily::OpenAiChat,
        openai_base.as_str(),
        Some(256),
        &["OPENAI_API_KEY", "OPENAI_API_KEY_BACKUP"],
        "OpenAI",
        false,
    );
    insert(
        "gemini-2.0-flash",
        WireFamily::Gemini,
        gemini_base.as_str(),
        Some(256),
        &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "Gemini",
        false,
    );

    map
}

use crate::config::{LlmConfig, ModelConfig, ModelsConfig};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// LLM provider: determines API format and endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenRouter,
    /// Any OpenAI-compatible API (local ollama, llama.cpp server, vLLM, ...)
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::OpenAi => "http://localhost:11434/v1",
        }
    }

    fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openrouter" => Ok(Self::OpenRouter),
            "openai" | "ollama" | "local" => Ok(Self::OpenAi),
            other => Err(Error::config(format!("unknown LLM provider: {other}"))),
        }
    }
}

/// One text-generation call against an inference backend.
///
/// Implementations do no retrying of their own. Rate limits, timeouts and
/// transport failures come back as transient [`Error`]s for the caller's
/// retry policy; everything else is terminal for the stage.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String>;
}

pub struct LlmClient {
    provider: Provider,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
    http: HttpClient,
}

// -- Anthropic format --

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Msg<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    text: Option<String>,
}

// -- OpenAI-compatible format --

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Msg<'a>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

// -- Shared --

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

impl LlmClient {
    pub fn new(
        provider: Provider,
        api_key: String,
        model: String,
        max_tokens: u32,
        base_url: Option<String>,
    ) -> Result<Self> {
        let http = HttpClient::new(concat!("st-newsdesk/", env!("CARGO_PKG_VERSION")))?;
        let base_url = base_url
            .unwrap_or_else(|| provider.default_base_url().into())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            provider,
            api_key,
            model,
            max_tokens,
            base_url,
            http,
        })
    }

    /// Build from config, reading the API key from the specified env var.
    /// Local servers usually need no key, so a missing variable is not an error.
    pub fn from_config(
        provider: Provider,
        model: String,
        max_tokens: u32,
        api_key_env: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self> {
        let env_var = api_key_env.unwrap_or_else(|| provider.default_api_key_env().into());
        let api_key = std::env::var(&env_var).unwrap_or_default();
        Self::new(provider, api_key, model, max_tokens, base_url)
    }

    fn from_model_config(config: &ModelConfig, fallback_max_tokens: u32) -> Result<Self> {
        Self::from_config(
            config.provider.clone(),
            config.model.clone(),
            config.max_tokens.unwrap_or(fallback_max_tokens),
            config.api_key_env.clone(),
            config.base_url.clone(),
        )
    }

    async fn complete_anthropic(
        &self,
        system: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![Msg {
                role: "user",
                content: user_message,
            }],
        };

        let body = serde_json::to_string(&request)
            .map_err(|e| Error::internal(format!("serialize request: {e}")))?;

        let url = format!("{}/messages", self.base_url);
        let response_text = self
            .http
            .post_json_raw(
                &url,
                &body,
                &[
                    ("x-api-key", &self.api_key),
                    ("anthropic-version", "2023-06-01"),
                ],
            )
            .await
            .inspect_err(|e| warn!("Anthropic API error: {e}"))?;

        let resp: AnthropicResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::parse(format!("parse Anthropic response: {e}")))?;

        Ok(resp
            .content
            .into_iter()
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn complete_openai(
        &self,
        system: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let request = OpenAiRequest {
            model: &self.model,
            max_tokens,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user_message,
                },
            ],
        };

        let body = serde_json::to_string(&request)
            .map_err(|e| Error::internal(format!("serialize request: {e}")))?;

        let url = format!("{}/chat/completions", self.base_url);
        let auth = format!("Bearer {}", self.api_key);
        let mut headers = Vec::new();
        if !self.api_key.is_empty() {
            headers.push(("Authorization", auth.as_str()));
        }
        let response_text = self
            .http
            .post_json_raw(&url, &body, &headers)
            .await
            .inspect_err(|e| warn!("LLM API error: {e}"))?;

        let resp: OpenAiResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::parse(format!("parse LLM response: {e}")))?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::parse("empty response from LLM"))
    }
}

#[async_trait]
impl ModelClient for LlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    /// `max_tokens` is capped at the client's configured limit.
    async fn generate(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let max_tokens = max_tokens.min(self.max_tokens);
        debug!(provider = ?self.provider, model = %self.model, max_tokens, "sending LLM request");

        match self.provider {
            Provider::Anthropic => self.complete_anthropic(system, prompt, max_tokens).await,
            Provider::OpenRouter | Provider::OpenAi => {
                self.complete_openai(system, prompt, max_tokens).await
            }
        }
    }
}

/// Which pipeline stage a model call serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Synthesis,
    Summary,
}

/// Picks the model client for each stage: a per-task override when one is
/// configured, otherwise the default `[llm]` client.
#[derive(Clone)]
pub struct ModelRouter {
    default: Arc<dyn ModelClient>,
    overrides: HashMap<TaskKind, Arc<dyn ModelClient>>,
}

impl ModelRouter {
    pub fn new(default: impl ModelClient + 'static) -> Self {
        Self::shared(Arc::new(default))
    }

    pub fn shared(default: Arc<dyn ModelClient>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_client(self, task: TaskKind, client: impl ModelClient + 'static) -> Self {
        self.with_shared(task, Arc::new(client))
    }

    pub fn with_shared(mut self, task: TaskKind, client: Arc<dyn ModelClient>) -> Self {
        self.overrides.insert(task, client);
        self
    }

    pub fn client_for(&self, task: TaskKind) -> Arc<dyn ModelClient> {
        self.overrides
            .get(&task)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Build the default client from `[llm]` and apply `[models.*]` overrides.
    pub fn from_config(llm: &LlmConfig, models: Option<&ModelsConfig>) -> Result<Self> {
        let default = LlmClient::from_config(
            llm.provider.clone(),
            llm.model.clone(),
            llm.max_tokens,
            llm.api_key_env.clone(),
            llm.base_url.clone(),
        )?;
        let mut router = Self::new(default);

        let Some(models) = models else {
            return Ok(router);
        };
        for (task, entry) in [
            (TaskKind::Synthesis, &models.synthesis),
            (TaskKind::Summary, &models.summary),
        ] {
            if let Some(model_config) = entry {
                debug!(?task, model = %model_config.model, "model override");
                router = router.with_client(
                    task,
                    LlmClient::from_model_config(model_config, llm.max_tokens)?,
                );
            }
        }
        Ok(router)
    }
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Remove `<think>…</think>` reasoning blocks that local reasoning models
/// emit ahead of their answer.
///
/// A leading close tag with no opener (the chat template opened the block)
/// drops everything before it; an unterminated block drops the rest.
pub fn strip_reasoning(text: &str) -> String {
    let mut rest = text;
    if let Some(close) = rest.find(THINK_CLOSE)
        && !rest[..close].contains(THINK_OPEN)
    {
        rest = &rest[close + THINK_CLOSE.len()..];
    }

    let mut out = String::with_capacity(rest.len());
    while let Some(start) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..start]);
        match rest[start..].find(THINK_CLOSE) {
            Some(end) => rest = &rest[start + end + THINK_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

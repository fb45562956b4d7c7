//! Model backends that turn an excerpt of page text into a short title.
//!
//! Every provider speaks one of three wire formats:
//! - OpenAI-style chat completions ([`ChatBackend`])
//! - Gemini `generateContent` ([`GeminiBackend`])
//! - Ollama `/api/generate` ([`OllamaBackend`])
//!
//! [`Backend`] picks the right one for a [`Provider`] and carries that
//! provider's retry policy.

pub mod budget;
mod chat;
mod gemini;
mod ollama;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use linkscribe_core::error::AppError;
use linkscribe_core::retry::RetryPolicy;
use linkscribe_core::traits::TitleGenerator;
use reqwest::{Client, Response};

pub use chat::ChatBackend;
pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that provides concise titles and summaries.";

/// The instruction sent with every excerpt.
pub fn user_prompt(excerpt: &str) -> String {
    format!(
        "Please provide a concise title for the following text:\n\n{excerpt}\n\nYou must return only the title."
    )
}

/// System and user text as one prompt, for backends that take a single
/// prompt string.
pub fn combined_prompt(excerpt: &str) -> String {
    format!("{SYSTEM_PROMPT}\n\n{}", user_prompt(excerpt))
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest slice of an unparseable error body echoed into error messages.
const ERROR_BODY_CHARS: usize = 200;

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gpt3,
    Gpt4,
    Claude,
    DeepSeek,
    Qwen,
    Ernie,
    Glm,
    Hunyuan,
    Spark,
    Gemini,
    Ollama,
}

impl Provider {
    pub const ALL: [Provider; 11] = [
        Provider::Gpt3,
        Provider::Gpt4,
        Provider::Claude,
        Provider::DeepSeek,
        Provider::Qwen,
        Provider::Ernie,
        Provider::Glm,
        Provider::Hunyuan,
        Provider::Spark,
        Provider::Gemini,
        Provider::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gpt3 => "gpt3",
            Provider::Gpt4 => "gpt4",
            Provider::Claude => "claude",
            Provider::DeepSeek => "deepseek",
            Provider::Qwen => "qwen",
            Provider::Ernie => "ernie",
            Provider::Glm => "glm",
            Provider::Hunyuan => "hunyuan",
            Provider::Spark => "spark",
            Provider::Gemini => "gemini",
            Provider::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Gpt3 | Provider::Gpt4 => "https://api.openai.com/v1",
            Provider::Claude => "https://api.anthropic.com/v1",
            Provider::DeepSeek => "https://api.deepseek.com",
            Provider::Qwen => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            Provider::Ernie => "https://qianfan.baidubce.com/v2",
            Provider::Glm => "https://open.bigmodel.cn/api/paas/v4",
            Provider::Hunyuan => "https://api.hunyuan.cloud.tencent.com/v1",
            Provider::Spark => "https://spark-api-open.xf-yun.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gpt3 => "gpt-3.5-turbo-16k",
            Provider::Gpt4 => "gpt-4o-mini",
            Provider::Claude => "claude-3-sonnet-20240229",
            Provider::DeepSeek => "deepseek-chat",
            Provider::Qwen => "qwen-max-latest",
            Provider::Ernie => "ernie-speed-128k",
            Provider::Glm => "glm-4-flash",
            Provider::Hunyuan => "hunyuan-lite",
            Provider::Spark => "general",
            Provider::Gemini => "gemini-1.5-pro-latest",
            Provider::Ollama => "qwen2:0.5b",
        }
    }

    /// Local providers run without credentials.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }

    /// Providers whose completion length is derived from the model's
    /// context window.
    pub fn is_token_budgeted(&self) -> bool {
        matches!(self, Provider::Gpt3 | Provider::Gpt4)
    }

    /// How failed title requests are retried for this provider.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Provider::Gpt3 | Provider::Gpt4 | Provider::Claude | Provider::Ollama => {
                RetryPolicy::new(Duration::from_secs(10), Duration::from_secs(300), 10)
            }
            Provider::Gemini => {
                RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(10), 10)
            }
            _ => RetryPolicy::none(),
        }
    }

    fn default_timeout(&self) -> Duration {
        match self {
            Provider::Ollama => Duration::from_secs(300),
            _ => DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| {
                let known: Vec<&str> = Provider::ALL.iter().map(Provider::as_str).collect();
                AppError::ConfigError(format!(
                    "unknown provider '{s}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

/// Sampling settings shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 64,
        }
    }
}

/// Everything needed to build a [`Backend`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    /// Overrides [`Provider::default_base_url`].
    pub base_url: Option<String>,
    /// Overrides [`Provider::default_model`].
    pub model: Option<String>,
    pub generation: GenerationConfig,
    /// Overrides the per-provider request timeout.
    pub timeout: Option<Duration>,
}

impl BackendConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            api_key: None,
            base_url: None,
            model: None,
            generation: GenerationConfig::default(),
            timeout: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
            .unwrap_or_else(|| self.provider.default_timeout())
    }

    /// The API key, or a configuration error when the provider needs one.
    fn require_api_key(&self) -> Result<String, AppError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ if self.provider.requires_api_key() => Err(AppError::ConfigError(format!(
                "provider '{}' requires an API key",
                self.provider
            ))),
            _ => Ok(String::new()),
        }
    }
}

/// A configured title generator for one provider.
#[derive(Clone)]
pub enum Backend {
    Chat(ChatBackend),
    Gemini(GeminiBackend),
    Ollama(OllamaBackend),
}

impl Backend {
    /// Build the backend for `config.provider`.
    ///
    /// Fails with a fatal error when a required key is missing or a
    /// budgeted provider is given a model without a known context window.
    pub fn from_config(config: &BackendConfig) -> Result<Self, AppError> {
        let api_key = config.require_api_key()?;
        let backend = match config.provider {
            Provider::Gemini => Backend::Gemini(GeminiBackend::new(config, api_key)?),
            Provider::Ollama => Backend::Ollama(OllamaBackend::new(config)?),
            _ => Backend::Chat(ChatBackend::new(config, api_key)?),
        };

        tracing::debug!(
            provider = %config.provider,
            model = config.model(),
            base_url = config.base_url(),
            "Configured model backend"
        );
        Ok(backend)
    }

    pub fn provider(&self) -> Provider {
        match self {
            Backend::Chat(b) => b.provider(),
            Backend::Gemini(_) => Provider::Gemini,
            Backend::Ollama(_) => Provider::Ollama,
        }
    }
}

impl TitleGenerator for Backend {
    async fn generate_title(&self, text: &str) -> Result<String, AppError> {
        match self {
            Backend::Chat(b) => b.generate(text).await,
            Backend::Gemini(b) => b.generate(text).await,
            Backend::Ollama(b) => b.generate(text).await,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.provider().retry_policy()
    }

    fn name(&self) -> &str {
        self.provider().as_str()
    }
}

// ---- shared HTTP plumbing ----

pub(crate) fn build_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::HttpError(e.to_string()))
}

/// Classify a failed send. Timeouts and connection trouble are transient.
pub(crate) fn send_error(provider: Provider, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::transient(provider.as_str(), format!("request timed out: {e}"))
    } else if e.is_connect() {
        AppError::transient(provider.as_str(), format!("connection failed: {e}"))
    } else if e.is_builder() || e.is_decode() {
        AppError::permanent(provider.as_str(), e.to_string())
    } else {
        AppError::transient(provider.as_str(), e.to_string())
    }
}

/// Classify a non-2xx response. 408, 429 and 5xx are worth retrying.
pub(crate) async fn status_error(provider: Provider, response: Response) -> AppError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        let snippet: String = body.chars().take(ERROR_BODY_CHARS).collect();
        format!("HTTP {status}: {snippet}")
    });

    if status == 408 || status == 429 || status >= 500 {
        AppError::transient(provider.as_str(), message)
    } else {
        AppError::permanent(provider.as_str(), format!("HTTP {status}: {message}"))
    }
}

/// Pull the human-readable message out of an error body.
///
/// Handles both `{"error": {"message": ...}}` and `{"error": "..."}`.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(serde_json::Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// Decode a success body, treating malformed JSON as permanent.
pub(crate) async fn decode_json<T: serde::de::DeserializeOwned>(
    provider: Provider,
    response: Response,
) -> Result<T, AppError> {
    response.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            AppError::transient(provider.as_str(), format!("response timed out: {e}"))
        } else {
            AppError::permanent(provider.as_str(), format!("failed to parse response: {e}"))
        }
    })
}

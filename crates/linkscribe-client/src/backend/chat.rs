use linkscribe_core::error::AppError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    BackendConfig, GenerationConfig, Provider, SYSTEM_PROMPT, budget, build_client, decode_json,
    send_error, status_error, user_prompt,
};

/// Nucleus sampling for providers that expect it set explicitly.
const GLM_TOP_P: f32 = 0.7;

/// OpenAI-compatible chat-completions backend.
///
/// Serves every provider that exposes `POST {base}/chat/completions`:
/// OpenAI, Anthropic's compatibility endpoint, DeepSeek, Qwen, Qianfan,
/// GLM, Hunyuan and Spark. Per-provider quirks are folded into the
/// request here.
#[derive(Clone)]
pub struct ChatBackend {
    client: Client,
    provider: Provider,
    base_url: String,
    api_key: String,
    model: String,
    generation: GenerationConfig,
    budgeted: bool,
}

impl ChatBackend {
    pub fn new(config: &BackendConfig, api_key: String) -> Result<Self, AppError> {
        let provider = config.provider;
        let model = config.model().to_string();

        let budgeted = provider.is_token_budgeted();
        if budgeted && budget::context_window(&model).is_none() {
            return Err(AppError::UnsupportedModel {
                provider: provider.to_string(),
                model,
            });
        }

        Ok(Self {
            client: build_client(config.timeout())?,
            provider,
            base_url: config.base_url().to_string(),
            api_key,
            model,
            generation: config.generation,
            budgeted,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn messages(&self, excerpt: &str) -> Vec<Message> {
        let prompt = user_prompt(excerpt);
        match self.provider {
            // Qianfan rejects a separate system role for several models.
            Provider::Ernie => vec![Message::user(format!("{SYSTEM_PROMPT} {prompt}"))],
            _ => vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
        }
    }

    fn max_tokens(&self, messages: &[Message]) -> Result<u32, AppError> {
        if !self.budgeted {
            return Ok(self.generation.max_output_tokens);
        }
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        budget::completion_budget(
            self.provider.as_str(),
            &self.model,
            &contents,
            self.generation.max_output_tokens,
        )
    }

    fn build_request(&self, excerpt: &str) -> Result<ChatRequest, AppError> {
        let messages = self.messages(excerpt);
        let max_tokens = self.max_tokens(&messages)?;

        Ok(ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.generation.temperature,
            max_tokens,
            top_p: (self.provider == Provider::Glm).then_some(GLM_TOP_P),
            stream: false,
        })
    }

    pub(crate) async fn generate(&self, excerpt: &str) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(excerpt)?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(self.provider, e))?;

        if !response.status().is_success() {
            return Err(status_error(self.provider, response).await);
        }

        let chat: ChatResponse = decode_json(self.provider, response).await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::permanent(self.provider.as_str(), "empty response from model"))
    }
}

// ---- chat-completions wire types ----

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

impl Message {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

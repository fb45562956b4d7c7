use linkscribe_core::error::AppError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    BackendConfig, GenerationConfig, Provider, build_client, combined_prompt, decode_json,
    send_error, status_error,
};

/// Gemini `generateContent` backend.
///
/// When the first candidate is cut short (safety, recitation) the text of
/// every candidate is gathered instead; only a response with no text at
/// all is an error.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    generation: GenerationConfig,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig, api_key: String) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(config.timeout())?,
            base_url: config.base_url().to_string(),
            api_key,
            model: config.model().to_string(),
            generation: config.generation,
        })
    }

    fn build_request(&self, excerpt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(combined_prompt(excerpt))],
            generation_config: GeminiGenerationConfig {
                temperature: self.generation.temperature,
                max_output_tokens: self.generation.max_output_tokens,
            },
        }
    }

    pub(crate) async fn generate(&self, excerpt: &str) -> Result<String, AppError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request(excerpt))
            .send()
            .await
            .map_err(|e| send_error(Provider::Gemini, e))?;

        if !response.status().is_success() {
            return Err(status_error(Provider::Gemini, response).await);
        }

        let body: GenerateContentResponse = decode_json(Provider::Gemini, response).await?;
        response_text(body)
    }
}

/// Text of a `generateContent` response.
fn response_text(response: GenerateContentResponse) -> Result<String, AppError> {
    let candidates = response.candidates.unwrap_or_default();

    if let Some(first) = candidates.first()
        && finished_normally(first.finish_reason.as_deref())
    {
        let text = first.text("");
        if !text.trim().is_empty() {
            return Ok(text);
        }
    }

    let recovered: String = candidates.iter().map(|c| c.text(" ")).collect();
    if !recovered.trim().is_empty() {
        tracing::warn!(
            finish_reason = candidates
                .first()
                .and_then(|c| c.finish_reason.as_deref())
                .unwrap_or("unknown"),
            "Recovered text from an incomplete Gemini response"
        );
        return Ok(recovered);
    }

    let reason = response
        .prompt_feedback
        .and_then(|f| f.block_reason)
        .or_else(|| candidates.into_iter().find_map(|c| c.finish_reason))
        .unwrap_or_else(|| "no candidates".to_string());
    Err(AppError::permanent(
        Provider::Gemini.as_str(),
        format!("response contained no text ({reason})"),
    ))
}

fn finished_normally(reason: Option<&str>) -> bool {
    matches!(reason, None | Some("STOP") | Some("MAX_TOKENS"))
}

// ---- generateContent wire types ----

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

impl Content {
    fn user(text: String) -> Self {
        Self {
            role: "user",
            parts: vec![RequestPart { text }],
        }
    }
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

impl Candidate {
    fn text(&self, separator: &str) -> String {
        self.content
            .iter()
            .flat_map(|content| &content.parts)
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

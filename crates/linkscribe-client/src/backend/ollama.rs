use linkscribe_core::error::AppError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    BackendConfig, GenerationConfig, Provider, build_client, combined_prompt, decode_json,
    send_error, status_error,
};

/// Local Ollama backend using the non-streaming `/api/generate` endpoint.
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    generation: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(config.timeout())?,
            base_url: config.base_url().to_string(),
            model: config.model().to_string(),
            generation: config.generation,
        })
    }

    pub(crate) async fn generate(&self, excerpt: &str) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: combined_prompt(excerpt),
            stream: false,
            options: Options {
                temperature: self.generation.temperature,
                num_predict: self.generation.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(Provider::Ollama, e))?;

        if !response.status().is_success() {
            return Err(status_error(Provider::Ollama, response).await);
        }

        let body: GenerateResponse = decode_json(Provider::Ollama, response).await?;
        if body.response.trim().is_empty() {
            return Err(AppError::permanent(
                Provider::Ollama.as_str(),
                "empty response from model",
            ));
        }
        Ok(body.response)
    }
}

//! OllamaProvider -- [`LlmProvider`] for a local Ollama server.
//!
//! Talks to `POST {base_url}/api/generate` with streaming disabled. Ollama has
//! no embedding support through this provider.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use medallion_core::llm::provider::LlmProvider;
use medallion_types::llm::{
    GenerateRequest, GenerateResponse, LlmError, ModelInfo, ProviderConfig,
};

use super::http::{build_client, read_json, request_error};

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    total_duration: u64,
    #[serde(default)]
    eval_duration: u64,
}

/// Local Ollama provider.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.effective_base_url(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            provider: "ollama".to_string(),
            max_tokens: 4096,
            context_size: 4096,
            supports_embeddings: false,
        }
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let body = OllamaRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: &request.system_prompt,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                top_p: request.top_p,
            },
        };

        tracing::debug!(model = %self.model, prompt_len = request.prompt.len(), "ollama generate");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        let resp: OllamaResponse = read_json(response).await?;

        // Request metadata first so backend fields win on collision.
        let mut metadata: BTreeMap<String, String> = request.metadata.clone();
        metadata.insert("model".to_string(), resp.model);
        metadata.insert("total_duration".to_string(), resp.total_duration.to_string());
        metadata.insert("eval_duration".to_string(), resp.eval_duration.to_string());

        Ok(GenerateResponse {
            text: resp.response,
            tokens_used: resp.eval_count,
            finish_reason: "stop".to_string(),
            metadata,
        })
    }

    async fn get_embedding(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::Unsupported(
            "embeddings are not supported by the ollama provider".to_string(),
        ))
    }
}

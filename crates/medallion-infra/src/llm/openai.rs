//! OpenAiProvider -- [`LlmProvider`] for hosted OpenAI-compatible APIs.
//!
//! Sends chat completions to `POST {base_url}/chat/completions` and embeddings
//! to `POST {base_url}/embeddings`, authenticating with a bearer token.
//!
//! The API key is wrapped in [`SecretString`] and only exposed while building
//! the `Authorization` header.

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use medallion_core::llm::provider::LlmProvider;
use medallion_types::llm::{
    GenerateRequest, GenerateResponse, LlmError, ModelInfo, ProviderConfig,
};

use super::http::{build_client, read_json, request_error};

/// Model used for `get_embedding`, independent of the chat model.
pub const EMBEDDING_MODEL: &str = "text-embedding-ada-002";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible provider.
///
/// Does not derive `Debug`; the key must never reach logs.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, api_key: SecretString) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client(config)?,
            api_key,
            base_url: config.effective_base_url(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, request: &'a GenerateRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            max_tokens: (request.max_tokens > 0).then_some(request.max_tokens),
            temperature: request.temperature,
            top_p: request.top_p,
            stop: &request.stop,
        }
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            provider: "openai".to_string(),
            max_tokens: 4096,
            context_size: 4096,
            supports_embeddings: true,
        }
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let body = self.build_request(request);

        tracing::debug!(model = %self.model, prompt_len = request.prompt.len(), "openai chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        let resp: ChatResponse = read_json(response).await?;

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Deserialization("no choices in response".to_string()))?;

        let mut metadata: BTreeMap<String, String> = request.metadata.clone();
        metadata.insert("model".to_string(), resp.model);
        metadata.insert(
            "prompt_tokens".to_string(),
            resp.usage.prompt_tokens.to_string(),
        );
        metadata.insert(
            "completion_tokens".to_string(),
            resp.usage.completion_tokens.to_string(),
        );

        Ok(GenerateResponse {
            text: choice.message.content.unwrap_or_default(),
            tokens_used: resp.usage.total_tokens,
            finish_reason: choice.finish_reason.unwrap_or_default(),
            metadata,
        })
    }

    async fn get_embedding(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = EmbeddingRequest {
            model: EMBEDDING_MODEL,
            input: text,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        let resp: EmbeddingResponse = read_json(response).await?;

        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::Deserialization("no embedding data in response".to_string()))
    }
}

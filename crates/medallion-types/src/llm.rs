//! Text-generation request/response types and provider configuration.
//!
//! These shapes are shared by every provider backend so that callers never see
//! backend-specific types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Request to a provider for a single generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl GenerateRequest {
    /// A request with the given prompt and the default sampling settings.
    pub fn new(prompt: impl Into<String>) -> Self {
        let defaults = GenerationDefaults::default();
        Self {
            prompt: prompt.into(),
            system_prompt: String::new(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            top_p: defaults.top_p,
            stop: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }
}

/// Response from a provider for a single generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    pub tokens_used: u32,
    pub finish_reason: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Static description of the model behind a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub provider: String,
    pub max_tokens: u32,
    pub context_size: u32,
    pub supports_embeddings: bool,
}

/// Errors from provider operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The backend answered with a non-2xx status.
    #[error("API request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response (connect, timeout, TLS...).
    #[error("request failed: {0}")]
    Request(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The backend does not implement this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("generation cancelled")]
    Cancelled,

    #[error("provider configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which backend protocol a provider registration speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local Ollama HTTP server (`/api/generate`).
    Ollama,
    /// Hosted OpenAI-compatible API (`/chat/completions`, bearer token).
    #[serde(alias = "openai_compatible")]
    Openai,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::Openai => "https://api.openai.com/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::Openai => write!(f, "openai"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" | "openai_compatible" => Ok(ProviderKind::Openai),
            other => Err(format!("invalid provider kind: '{other}'")),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

/// Per-provider configuration, injected when the executor is built.
///
/// `Debug` is implemented by hand so the API key never reaches logs.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Defaults to [`ProviderKind::default_base_url`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable to read the API key from when `api_key` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra headers attached to every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub model: String,
    /// Parsed and reported only; requests are never retried automatically.
    #[serde(default)]
    pub max_retries: u32,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: None,
            api_key: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            headers: BTreeMap::new(),
            model: model.into(),
            max_retries: 0,
        }
    }

    /// Effective base URL without a trailing slash.
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(self.kind.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .field("timeout_secs", &self.timeout_secs)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Sampling settings applied to every step's generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationDefaults {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: None,
        }
    }
}

//! Shared HTTP plumbing for the provider backends.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

use medallion_types::llm::{LlmError, ProviderConfig};

/// Build a client honouring the registration's timeout and extra headers.
pub(crate) fn build_client(config: &ProviderConfig) -> Result<reqwest::Client, LlmError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LlmError::Configuration(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            LlmError::Configuration(format!("invalid value for header '{name}': {e}"))
        })?;
        headers.insert(name, value);
    }

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Transport failures before any status line was received.
pub(crate) fn request_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Request(format!("request timed out: {e}"))
    } else {
        LlmError::Request(format!("HTTP request failed: {e}"))
    }
}

/// Reject non-2xx responses with their status and body, then decode JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, LlmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use medallion_types::llm::ProviderKind;

    #[test]
    fn test_build_client_rejects_bad_header() {
        let mut config = ProviderConfig::new(ProviderKind::Ollama, "llama3.1");
        config.headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            build_client(&config).unwrap_err(),
            LlmError::Configuration(_)
        ));
    }

    #[test]
    fn test_build_client_accepts_custom_headers() {
        let mut config = ProviderConfig::new(ProviderKind::Openai, "gpt-4o");
        config
            .headers
            .insert("OpenAI-Organization".to_string(), "org-1".to_string());
        assert!(build_client(&config).is_ok());
    }
}

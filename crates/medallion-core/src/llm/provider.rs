//! LlmProvider trait definition.
//!
//! This is the core abstraction that all text-generation backends implement.

use std::future::Future;

use medallion_types::llm::{GenerateRequest, GenerateResponse, LlmError, ModelInfo};

/// Trait for text-generation backends (Ollama, OpenAI-compatible, ...).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Cancellation
/// is the caller's concern: dropping a `generate` future aborts the
/// in-flight request.
///
/// Implementations live in medallion-infra (e.g., `OllamaProvider`).
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "ollama", "openai").
    fn name(&self) -> &str;

    /// Static description of the configured model.
    fn model_info(&self) -> ModelInfo;

    /// Generate a completion for a single prompt.
    ///
    /// Non-2xx backend responses map to [`LlmError::Http`] with status and body.
    fn generate(
        &self,
        request: &GenerateRequest,
    ) -> impl Future<Output = Result<GenerateResponse, LlmError>> + Send;

    /// Embed a piece of text. Backends without embeddings return
    /// [`LlmError::Unsupported`].
    fn get_embedding(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    /// Release backend resources. The default does nothing.
    fn close(&self) -> impl Future<Output = Result<(), LlmError>> + Send {
        async { Ok(()) }
    }
}

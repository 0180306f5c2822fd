//! Model service integration.
//!
//! Provides the [`LlmClient`] trait the pipeline talks to, the Ollama
//! implementation, prompt construction and SQL extraction.

pub mod mock;
pub mod ollama;
pub mod parser;
pub mod prompt;

pub use mock::{MockLlmClient, MockReply};
pub use ollama::{OllamaClient, OllamaConfig};
pub use parser::{extract_sql, GeneratedStatement};
pub use prompt::{build_prompt, PromptTemplate};

use async_trait::async_trait;

use crate::error::Result;

/// Trait for text-completion model services.
///
/// Implementations must be thread-safe (Send + Sync); one client is shared
/// by every in-flight request.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier requests are sent for.
    fn model(&self) -> &str;

    /// Generates a completion for `prompt`.
    ///
    /// A single attempt; callers decide whether to retry.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Lists the model names the service has available locally.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Downloads the configured model onto the service.
    async fn pull_model(&self) -> Result<()>;

    /// Returns true if the service answers at all.
    async fn is_available(&self) -> bool {
        self.list_models().await.is_ok()
    }

    /// Returns true if the configured model is already present.
    ///
    /// Matches by substring so `llama3` finds `llama3:latest`.
    async fn has_model(&self) -> Result<bool> {
        let wanted = self.model();
        Ok(self
            .list_models()
            .await?
            .iter()
            .any(|name| name.contains(wanted)))
    }
}

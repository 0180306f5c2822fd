//! Ollama LLM client implementation.
//!
//! Implements the LlmClient trait against a local Ollama instance using the
//! non-streaming `/api/generate` endpoint.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{AskError, Result};
use crate::llm::LlmClient;

/// Default Ollama API URL.
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Timeout for cheap metadata calls such as `/api/tags`.
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for establishing the TCP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ollama client configuration.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model to use (e.g., "qwen2.5-coder:1.5b").
    pub model: String,
    /// Generation timeout.
    pub timeout: Duration,
    /// Model download timeout.
    pub pull_timeout: Duration,
    pub temperature: f32,
    pub top_p: f32,
}

impl OllamaConfig {
    /// Creates a new config with the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::from(&LlmConfig::default())
        }
    }

    /// Sets the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl From<&LlmConfig> for OllamaConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            pull_timeout: Duration::from_secs(config.pull_timeout_secs),
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::from(&LlmConfig::default()).with_url(DEFAULT_OLLAMA_URL)
    }
}

/// Ollama LLM client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    client: Client,
}

impl OllamaClient {
    /// Creates a new Ollama client with the given configuration.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AskError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn generate_request<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
            },
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("/api/generate"))
            .timeout(self.config.timeout)
            .json(&self.generate_request(prompt))
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_request_error)?;

        if !status.is_success() {
            warn!(%status, body = body.trim(), "Ollama generate request failed");
            return Err(AskError::model(format!("model service returned {status}")));
        }

        parse_generate_response(&body)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AskError::model(format!("Ollama API error ({status})")));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| AskError::model(format!("Failed to parse model list: {e}")))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull_model(&self) -> Result<()> {
        info!(model = %self.config.model, "Pulling model");

        let response = self
            .client
            .post(self.url("/api/pull"))
            .timeout(self.config.pull_timeout)
            .json(&PullRequest {
                name: &self.config.model,
                stream: true,
            })
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = body.trim(), "Ollama pull request failed");
            return Err(AskError::model(format!("model pull returned {status}")));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut last_status = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(map_request_error)?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                if let Some(status) = parse_pull_line(&line)? {
                    if status != last_status {
                        debug!(model = %self.config.model, %status, "Pull progress");
                        last_status = status;
                    }
                }
            }
        }
        parse_pull_line(&buffer)?;

        info!(model = %self.config.model, "Model pull finished");
        Ok(())
    }
}

/// Maps transport failures to the model error taxonomy.
fn map_request_error(e: reqwest::Error) -> AskError {
    if e.is_timeout() {
        AskError::model_timeout("the model service did not answer in time")
    } else if e.is_connect() {
        AskError::model_unavailable("failed to connect to the model service")
    } else if e.is_decode() || e.is_body() {
        AskError::model(format!("failed to read model response: {e}"))
    } else {
        AskError::model_unavailable(format!("model request failed: {e}"))
    }
}

fn parse_generate_response(body: &str) -> Result<String> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| AskError::model(format!("Failed to parse response: {e}")))?;

    response
        .response
        .ok_or_else(|| AskError::model("response field missing from model output"))
}

/// Parses one NDJSON line of pull progress, returning its status text.
fn parse_pull_line(line: &str) -> Result<Option<String>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let event: PullEvent = serde_json::from_str(line)
        .map_err(|e| AskError::model(format!("Malformed pull progress: {e}")))?;

    match event.error {
        Some(error) => Err(AskError::model(format!("Model pull failed: {error}"))),
        None => Ok(event.status),
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullEvent {
    status: Option<String>,
    error: Option<String>,
}

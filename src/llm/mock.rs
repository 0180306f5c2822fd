//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns, plus a
//! scripted reply queue for exercising failure paths.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{AskError, Result};
use crate::llm::LlmClient;

/// A scripted outcome for one `complete` call.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail as if the request timed out.
    Timeout,
    /// Fail as if the service were unreachable.
    Unavailable,
    /// Fail as if the service answered with an error status.
    Error(String),
}

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Scripted replies are consumed first, in order; once the script is
/// exhausted, the pattern table answers.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    model: String,
    /// Custom response mappings (pattern -> response).
    custom_responses: Vec<(String, String)>,
    script: Arc<Mutex<VecDeque<MockReply>>>,
    installed: Option<Vec<String>>,
    reachable: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    pulls: Arc<AtomicUsize>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self {
            model: "mock-sql".to_string(),
            reachable: true,
            ..Self::default()
        }
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Adds a custom response mapping.
    ///
    /// When the prompt contains `pattern`, the mock will return `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Queues scripted replies for the next `complete` calls.
    pub fn with_script(self, replies: impl IntoIterator<Item = MockReply>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(replies);
        }
        self
    }

    /// Sets the models reported as installed. Defaults to the configured model.
    pub fn with_installed_models(mut self, models: Vec<String>) -> Self {
        self.installed = Some(models);
        self
    }

    /// Makes every call fail as unreachable.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Delays every `complete` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `pull_model` calls made so far.
    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Generates a mock response based on the question in the prompt.
    fn mock_response(&self, prompt: &str) -> String {
        let input_lower = question_of(prompt).to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if input_lower.contains("all users") || input_lower.contains("show users") {
            return "```sql\nSELECT * FROM users;\n```".to_string();
        }

        if input_lower.contains("count") && input_lower.contains("users") {
            return "SELECT COUNT(*) AS total FROM users".to_string();
        }

        if input_lower.contains("delete") && input_lower.contains("user") {
            return "```sql\nDELETE FROM users WHERE id = 1;\n```".to_string();
        }

        "I don't understand that question. Could you please rephrase it?".to_string()
    }

    fn next_scripted(&self) -> Option<MockReply> {
        self.script.lock().ok().and_then(|mut script| script.pop_front())
    }
}

/// Pulls the quoted question back out of a rendered prompt.
fn question_of(prompt: &str) -> &str {
    prompt
        .lines()
        .find_map(|line| line.trim().strip_prefix("Question:"))
        .map(str::trim)
        .unwrap_or(prompt)
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.reachable {
            return Err(AskError::model_unavailable("mock model service is unreachable"));
        }

        match self.next_scripted() {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Timeout) => Err(AskError::model_timeout("mock request timed out")),
            Some(MockReply::Unavailable) => {
                Err(AskError::model_unavailable("mock connection refused"))
            }
            Some(MockReply::Error(msg)) => Err(AskError::model(msg)),
            None => Ok(self.mock_response(prompt)),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        if !self.reachable {
            return Err(AskError::model_unavailable("mock model service is unreachable"));
        }
        Ok(self
            .installed
            .clone()
            .unwrap_or_else(|| vec![self.model.clone()]))
    }

    async fn pull_model(&self) -> Result<()> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(AskError::model_unavailable("mock model service is unreachable"));
        }
        Ok(())
    }
}

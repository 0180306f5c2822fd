//! Prompt construction for model requests.
//!
//! Renders the fixed instruction template with schema hints and the question.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PromptConfig;
use crate::db::{DatabaseClient, Schema};
use crate::error::Result;

/// Instruction template for SQL generation.
const PROMPT_TEMPLATE: &str = r#"You are a PostgreSQL expert. Write one SQL query that answers the question below.

DATABASE SCHEMA:
{schema}

RULES:
- Return ONLY the SQL query, no explanations
- Use standard PostgreSQL syntax
- The query must start with SELECT and must not modify data
- Write exactly one statement and do not end it with a semicolon
- Do not use markdown formatting
- Limit results to 100 rows unless the question asks otherwise

Question: "{question}"

SQL Query:"#;

/// Placeholder used when no schema description is available.
const UNKNOWN_SCHEMA: &str = "(schema not available; use only tables the question names)";

/// Prompt template with the schema section already rendered.
///
/// Built once at startup and shared by all requests.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    schema_hint: Arc<str>,
}

impl PromptTemplate {
    /// Creates a template around a free-form schema description.
    pub fn new(schema_hint: impl Into<String>) -> Self {
        let hint = schema_hint.into();
        let hint = if hint.trim().is_empty() {
            UNKNOWN_SCHEMA.to_string()
        } else {
            hint.trim().to_string()
        };
        Self {
            schema_hint: Arc::from(hint),
        }
    }

    /// Creates a template from an introspected schema.
    pub fn from_schema(schema: &Schema) -> Self {
        Self::new(schema.format_for_llm())
    }

    /// Resolves the schema section once at startup.
    ///
    /// A configured hint wins; otherwise the database is introspected when
    /// allowed. An introspection failure is logged and leaves the
    /// placeholder in place.
    pub async fn resolve(config: &PromptConfig, db: &dyn DatabaseClient) -> Result<Self> {
        if let Some(hint) = config.load_hint()? {
            return Ok(Self::new(hint));
        }
        if !config.introspect {
            return Ok(Self::default());
        }

        match db.introspect_schema().await {
            Ok(schema) if !schema.is_empty() => {
                info!(tables = schema.tables.len(), "Schema introspected for prompts");
                Ok(Self::from_schema(&schema))
            }
            Ok(_) => {
                warn!("Public schema has no tables; prompts carry no schema hint");
                Ok(Self::default())
            }
            Err(e) => {
                warn!(error = %e, "Schema introspection failed; prompts carry no schema hint");
                Ok(Self::default())
            }
        }
    }

    /// Returns the rendered schema section.
    pub fn schema_hint(&self) -> &str {
        &self.schema_hint
    }

    /// Renders the prompt for one question.
    pub fn render(&self, question: &str) -> String {
        build_prompt(&self.schema_hint, question)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new("")
    }
}

/// Builds the full prompt for `question` with the given schema description.
///
/// Double quotes in the question are replaced so it cannot close the
/// quoted block early.
pub fn build_prompt(schema_hint: &str, question: &str) -> String {
    let question = question.trim().replace('"', "'");
    PROMPT_TEMPLATE
        .replace("{schema}", schema_hint)
        .replace("{question}", &question)
}

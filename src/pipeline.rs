//! Request pipeline: question in, rows or a typed failure out.
//!
//! A request moves through an explicit state machine:
//!
//! ```text
//! Received -> Generating -> Extracting -> Validating -> Executing -> Responding
//!     \____________\____________\____________\____________\---> Failed
//! ```
//!
//! Each state carries the data its stage needs and [`Pipeline::step`] maps a
//! state to its successor. `Validating -> Failed` never reaches the executor.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::QueryResult;
use crate::error::{AskError, Result};
use crate::llm::{GeneratedStatement, LlmClient, PromptTemplate};
use crate::query::QueryExecutor;
use crate::safety::{gate, ValidatedSql};

/// Maximum question length in characters.
pub const MAX_QUESTION_CHARS: usize = 500;

/// Attempts per stage for failures that are retried (one retry).
const MAX_ATTEMPTS: u32 = 2;

/// A successful run.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub question: String,
    pub sql: String,
    pub result: QueryResult,
}

/// A failed run. `sql` is set once a statement was extracted.
#[derive(Debug)]
pub struct Failure {
    pub error: AskError,
    pub sql: Option<String>,
}

impl Failure {
    fn new(error: AskError, sql: Option<String>) -> Self {
        Self { error, sql }
    }
}

/// Pipeline states.
#[derive(Debug)]
pub enum State {
    Received { question: String },
    Generating { prompt: String, attempt: u32 },
    Extracting { raw: String },
    Validating { sql: String },
    Executing { sql: ValidatedSql, attempt: u32 },
    Responding { sql: ValidatedSql, result: QueryResult },
    Failed(Failure),
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Received { .. } => "received",
            Self::Generating { .. } => "generating",
            Self::Extracting { .. } => "extracting",
            Self::Validating { .. } => "validating",
            Self::Executing { .. } => "executing",
            Self::Responding { .. } => "responding",
            Self::Failed(_) => "failed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Responding { .. } | Self::Failed(_))
    }
}

/// Orchestrates one question end to end. Cheap to clone; shared by handlers.
#[derive(Clone)]
pub struct Pipeline {
    llm: Arc<dyn LlmClient>,
    executor: QueryExecutor,
    prompt: PromptTemplate,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LlmClient>, executor: QueryExecutor, prompt: PromptTemplate) -> Self {
        Self {
            llm,
            executor,
            prompt,
        }
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Runs `question` to completion or failure.
    pub async fn ask(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<AskOutcome, Failure> {
        let start = Instant::now();
        let question = question.trim().to_string();
        let mut sql_seen: Option<String> = None;
        let mut state = State::Received {
            question: question.clone(),
        };

        while !state.is_terminal() {
            let from = state.name();
            state = self.step(state, &mut sql_seen, cancel).await;
            debug!(from, to = state.name(), "Pipeline transition");
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match state {
            State::Responding { sql, result } => {
                info!(
                    rows = result.row_count(),
                    truncated = result.truncated,
                    elapsed_ms,
                    "Question answered"
                );
                Ok(AskOutcome {
                    question,
                    sql: sql.into_inner(),
                    result,
                })
            }
            State::Failed(failure) => {
                warn!(
                    kind = %failure.error.kind(),
                    category = failure.error.category(),
                    error = %failure.error,
                    elapsed_ms,
                    "Question failed"
                );
                Err(failure)
            }
            other => Err(Failure::new(
                AskError::internal(format!("pipeline stopped in state {}", other.name())),
                sql_seen,
            )),
        }
    }

    /// Advances one state. `sql_seen` records the extracted statement so
    /// later failures can report it.
    pub async fn step(
        &self,
        state: State,
        sql_seen: &mut Option<String>,
        cancel: &CancellationToken,
    ) -> State {
        match state {
            State::Received { question } => match check_question(&question) {
                Ok(()) => State::Generating {
                    prompt: self.prompt.render(&question),
                    attempt: 1,
                },
                Err(e) => State::Failed(Failure::new(e, None)),
            },

            State::Generating { prompt, attempt } => {
                match cancellable(cancel, self.llm.complete(&prompt)).await {
                    Ok(raw) => State::Extracting { raw },
                    Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                        warn!(attempt, error = %e, "Model request failed, retrying");
                        State::Generating {
                            prompt,
                            attempt: attempt + 1,
                        }
                    }
                    Err(e) => State::Failed(Failure::new(e, None)),
                }
            }

            State::Extracting { raw } => {
                let generated = GeneratedStatement::from_model_output(raw);
                match generated.sql() {
                    Ok(sql) => {
                        *sql_seen = Some(sql.to_string());
                        State::Validating {
                            sql: sql.to_string(),
                        }
                    }
                    Err(e) => {
                        debug!(output = %generated.raw_model_output, "No SQL in model output");
                        State::Failed(Failure::new(e, None))
                    }
                }
            }

            State::Validating { sql } => match gate(&sql) {
                Ok(validated) => State::Executing {
                    sql: validated,
                    attempt: 1,
                },
                Err(e) => State::Failed(Failure::new(e, Some(sql))),
            },

            State::Executing { sql, attempt } => {
                match cancellable(cancel, self.executor.execute(&sql)).await {
                    Ok(result) => State::Responding { sql, result },
                    Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                        warn!(attempt, error = %e, "Statement failed, retrying");
                        State::Executing {
                            sql,
                            attempt: attempt + 1,
                        }
                    }
                    Err(e) => State::Failed(Failure::new(e, Some(sql.into_inner()))),
                }
            }

            terminal @ (State::Responding { .. } | State::Failed(_)) => terminal,
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("model", &self.llm.model())
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// Rejects empty and oversized questions.
pub fn check_question(question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(AskError::invalid_request("question must not be empty"));
    }
    let len = question.chars().count();
    if len > MAX_QUESTION_CHARS {
        return Err(AskError::invalid_request(format!(
            "question is {len} characters; the limit is {MAX_QUESTION_CHARS}"
        )));
    }
    Ok(())
}

/// Races `fut` against shutdown.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AskError::Cancelled),
        result = fut => result,
    }
}

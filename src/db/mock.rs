//! Mock database client for testing.
//!
//! Provides an in-memory database implementation for headless testing.
//! Every executed statement is recorded so tests can assert what reached
//! the database (and what never did).

use super::{DatabaseClient, ExecutionLimits, QueryResult, Schema, Value};
use crate::error::{AskError, Result};
use crate::safety::ValidatedSql;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A scripted outcome for one `execute_read_only` call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return these rows (still subject to the row cap).
    Rows(QueryResult),
    /// Fail as if the statement timeout fired.
    Timeout,
    /// Fail as if the connection dropped mid-query.
    ConnectionLost,
    /// Fail as if the database rejected the statement.
    Error(String),
    /// Fail as if the pool had no free connection.
    Busy,
}

/// A mock database client that returns predefined results.
#[derive(Debug, Clone, Default)]
pub struct MockDatabaseClient {
    schema: Schema,
    /// Results keyed by a case-insensitive substring of the statement.
    results: Vec<(String, QueryResult)>,
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    delay: Option<Duration>,
    unreachable: bool,
    executed: Arc<Mutex<Vec<String>>>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new mock database client with the given schema.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Returns `result` for statements containing `pattern`.
    pub fn with_result(mut self, pattern: impl Into<String>, result: QueryResult) -> Self {
        self.results.push((pattern.into(), result));
        self
    }

    /// Queues scripted outcomes for the next executions.
    pub fn with_script(self, outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(outcomes);
        }
        self
    }

    /// Delays every execution, for exercising client-side timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes `ping` and every execution fail with a connection error.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }

    pub fn execution_count(&self) -> usize {
        self.executed().len()
    }

    fn next_scripted(&self) -> Option<MockOutcome> {
        self.script.lock().ok().and_then(|mut script| script.pop_front())
    }

    fn canned_result(&self, sql: &str) -> QueryResult {
        let sql_lower = sql.to_lowercase();
        self.results
            .iter()
            .find(|(pattern, _)| sql_lower.contains(&pattern.to_lowercase()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| {
                QueryResult::with_data(
                    vec!["result".to_string()],
                    vec![vec![Value::String(format!("Mock result for: {sql}"))]],
                )
            })
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_read_only(
        &self,
        sql: &ValidatedSql,
        limits: &ExecutionLimits,
    ) -> Result<QueryResult> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.as_str().to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(AskError::connection("mock database is unreachable"));
        }

        let result = match self.next_scripted() {
            Some(MockOutcome::Rows(result)) => result,
            Some(MockOutcome::Timeout) => {
                return Err(AskError::execution_timeout(format!(
                    "statement exceeded {}ms",
                    limits.statement_timeout.as_millis()
                )))
            }
            Some(MockOutcome::ConnectionLost) => {
                return Err(AskError::connection("mock connection reset"))
            }
            Some(MockOutcome::Error(msg)) => return Err(AskError::execution(msg)),
            Some(MockOutcome::Busy) => {
                return Err(AskError::busy("no database connection available"))
            }
            None => self.canned_result(sql.as_str()),
        };

        Ok(result
            .with_execution_time(Duration::from_millis(1))
            .truncate_to(limits.row_cap))
    }

    async fn ping(&self) -> Result<()> {
        if self.unreachable {
            return Err(AskError::connection("mock database is unreachable"));
        }
        Ok(())
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    async fn close(&self) {}
}

//! Bounded, read-only query execution.
//!
//! The executor only accepts statements that passed the safety gate and
//! wraps every call in a client-side deadline that backs up the server-side
//! statement timeout.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::db::{DatabaseClient, ExecutionLimits, QueryResult};
use crate::error::{AskError, Result};
use crate::safety::ValidatedSql;

/// Query executor shared by all requests.
#[derive(Clone)]
pub struct QueryExecutor {
    db: Arc<dyn DatabaseClient>,
    limits: ExecutionLimits,
}

impl QueryExecutor {
    /// Creates a new query executor.
    pub fn new(db: Arc<dyn DatabaseClient>, limits: ExecutionLimits) -> Self {
        Self { db, limits }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// The underlying database, for health probes.
    pub fn database(&self) -> &Arc<dyn DatabaseClient> {
        &self.db
    }

    /// Runs an approved statement under the configured limits.
    ///
    /// A statement that outlives `limits.client_timeout()` fails with
    /// `ExecutionTimeout` and no rows.
    pub async fn execute(&self, sql: &ValidatedSql) -> Result<QueryResult> {
        let start = Instant::now();
        let deadline = self.limits.client_timeout();

        let result = tokio::time::timeout(deadline, self.db.execute_read_only(sql, &self.limits))
            .await
            .map_err(|_| {
                AskError::execution_timeout(format!(
                    "statement did not finish within {}ms",
                    self.limits.statement_timeout.as_millis()
                ))
            })??;

        debug!(
            rows = result.row_count(),
            truncated = result.truncated,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Statement executed"
        );

        Ok(result)
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

//! Database abstraction layer for db-ask.
//!
//! Provides a trait-based interface for read-only statement execution so the
//! pipeline can run against PostgreSQL or an in-memory mock.

mod mock;
mod postgres;
mod schema;
mod types;

pub use mock::{MockDatabaseClient, MockOutcome};
pub use postgres::{summarize_database_error, PostgresClient};
pub use schema::{Column, ForeignKey, Schema, Table};
pub use types::{QueryResult, Records, Row, Value};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::safety::ValidatedSql;
use async_trait::async_trait;
use std::time::Duration;

/// Bounds applied to every executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Server-side statement timeout.
    pub statement_timeout: Duration,

    /// Maximum rows returned; further rows are discarded and flagged.
    pub row_cap: usize,

    /// Extra time the client waits past `statement_timeout` before giving up
    /// on the database answering at all.
    pub grace: Duration,
}

impl ExecutionLimits {
    pub fn new(statement_timeout: Duration, row_cap: usize) -> Self {
        Self {
            statement_timeout,
            row_cap,
            grace: Duration::from_millis(500),
        }
    }

    /// Sets the client-side grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Total time the client waits for a statement.
    pub fn client_timeout(&self) -> Duration {
        self.statement_timeout + self.grace
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 1000)
    }
}

/// Connects to PostgreSQL using the given configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<PostgresClient> {
    PostgresClient::connect(config).await
}

/// Trait defining the interface for database clients.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes an approved statement inside a read-only transaction.
    ///
    /// The transaction is always rolled back. At most `limits.row_cap` rows
    /// come back; `truncated` reports whether more existed.
    async fn execute_read_only(
        &self,
        sql: &ValidatedSql,
        limits: &ExecutionLimits,
    ) -> Result<QueryResult>;

    /// Checks that the database answers a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Introspects the public schema for prompt hints.
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Closes the connection pool.
    async fn close(&self);
}

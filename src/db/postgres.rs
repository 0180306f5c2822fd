//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use crate::config::{ConnectionConfig, DatabaseConfig};
use crate::db::{DatabaseClient, ExecutionLimits, ForeignKey, QueryResult, Row, Schema, Value};
use crate::error::{AskError, Result};
use crate::safety::ValidatedSql;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// How long a health probe may take.
const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// PostgreSQL database client.
#[derive(Debug, Clone)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Creates a new PostgresClient from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens the connection pool, retrying transient failures with backoff.
    ///
    /// If the database stays unreachable, a lazy pool is returned instead so
    /// the service can start and report the outage through `/health`.
    /// Malformed connection settings are still an error.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let conn_str = config.connection_string()?;
        let options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout());

        let attempts = config.connect_attempts.max(1);
        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=attempts {
            debug!(attempt, attempts, "Connecting to database");

            match options.clone().connect(&conn_str).await {
                Ok(pool) => {
                    info!(database = %config.display_string(), "Connected to database");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let transient = is_transient_error(&e);
                    last_error = Some(e);

                    if !transient {
                        break;
                    }
                    if attempt < attempts {
                        warn!(attempt, ?delay, "Database connection failed, retrying");
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        if let Some(error) = last_error {
            let mapped = map_connection_error(error, config);
            warn!(error = %mapped, "Database unreachable at startup, continuing with a lazy pool");
        }

        let pool = options
            .connect_lazy(&conn_str)
            .map_err(|e| AskError::config(format!("Invalid database settings: {e}")))?;
        Ok(Self { pool })
    }

    /// Maps an error raised while acquiring or using a pooled connection.
    ///
    /// An acquire timeout is only `ServiceBusy` when every connection is
    /// checked out; otherwise the pool could not open one at all.
    fn map_error(&self, error: sqlx::Error) -> AskError {
        match error {
            sqlx::Error::PoolTimedOut if !pool_saturated(&self.pool) => {
                AskError::connection("could not open a database connection")
            }
            other => map_query_error(other),
        }
    }

    async fn run_read_only(
        &self,
        sql: &ValidatedSql,
        limits: &ExecutionLimits,
    ) -> Result<QueryResult> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(|e| self.map_error(e))?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| self.map_error(e))?;

        let timeout_ms = limits.statement_timeout.as_millis().max(1);
        let set_timeout = format!("SET LOCAL statement_timeout = {timeout_ms}");
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.map_error(e))?;

        let mut columns: Option<Vec<String>> = None;
        let mut rows: Vec<Row> = Vec::new();
        let mut truncated = false;

        {
            let mut stream = sqlx::query(sql.as_str()).fetch(&mut *tx);
            while let Some(row) = stream.try_next().await.map_err(|e| self.map_error(e))? {
                if columns.is_none() {
                    columns = Some(column_names(&row));
                }
                if rows.len() >= limits.row_cap {
                    truncated = true;
                    break;
                }
                rows.push(convert_row(&row));
            }
        }

        // No rows means no row metadata; ask the server for the statement shape.
        let columns = match columns {
            Some(columns) => columns,
            None => (&mut *tx)
                .describe(sql.as_str())
                .await
                .map_err(|e| self.map_error(e))?
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect(),
        };

        if let Err(e) = tx.rollback().await {
            warn!(error = %e, "Rollback of read-only transaction failed");
        }

        if truncated {
            debug!(row_cap = limits.row_cap, "Result truncated at row cap");
        }

        Ok(QueryResult {
            columns,
            rows,
            execution_time: start.elapsed(),
            truncated,
        })
    }

    async fn fetch_schema(&self) -> Result<Schema> {
        let columns: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                c.table_name::text,
                c.column_name::text,
                c.data_type::text,
                c.is_nullable::text
            FROM information_schema.columns c
            JOIN information_schema.tables t
                ON t.table_schema = c.table_schema
                AND t.table_name = c.table_name
            WHERE c.table_schema = 'public' AND t.table_type = 'BASE TABLE'
            ORDER BY c.table_name, c.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskError::internal(format!("Failed to fetch columns: {e}")))?;

        let mut schema = Schema::from_column_rows(columns.into_iter().map(
            |(table, column, data_type, is_nullable)| {
                (table, column, data_type, is_nullable == "YES")
            },
        ));

        let primary_keys: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT tc.table_name::text, kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = 'public'
                AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY tc.table_name, kcu.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskError::internal(format!("Failed to fetch primary keys: {e}")))?;
        schema.apply_primary_keys(primary_keys);

        schema.foreign_keys = self.fetch_foreign_keys().await?;
        Ok(schema)
    }

    /// Fetches foreign keys grouped by constraint.
    async fn fetch_foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                tc.constraint_name::text,
                kcu.table_name::text AS from_table,
                kcu.column_name::text AS from_column,
                ccu.table_name::text AS to_table,
                ccu.column_name::text AS to_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON tc.constraint_name = ccu.constraint_name
                AND tc.table_schema = ccu.table_schema
            WHERE tc.table_schema = 'public'
                AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY tc.constraint_name, kcu.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskError::internal(format!("Failed to fetch foreign keys: {e}")))?;

        let mut keys: Vec<(String, ForeignKey)> = Vec::new();
        for (constraint, from_table, from_column, to_table, to_column) in rows {
            match keys.last_mut() {
                Some((name, fk)) if *name == constraint => {
                    fk.from_columns.push(from_column);
                    fk.to_columns.push(to_column);
                }
                _ => keys.push((
                    constraint,
                    ForeignKey::new(from_table, vec![from_column], to_table, vec![to_column]),
                )),
            }
        }

        Ok(keys.into_iter().map(|(_, fk)| fk).collect())
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn execute_read_only(
        &self,
        sql: &ValidatedSql,
        limits: &ExecutionLimits,
    ) -> Result<QueryResult> {
        self.run_read_only(sql, limits).await
    }

    async fn ping(&self) -> Result<()> {
        tokio::time::timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map_err(|_| AskError::connection("database did not answer the health probe"))?
            .map_err(|e| self.map_error(e))?;
        Ok(())
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        self.fetch_schema().await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn column_names(row: &PgRow) -> Vec<String> {
    row.columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if !raw.is_null() => {}
        _ => return Value::Null,
    }

    let decoded = match type_name {
        "BOOL" => row.try_get::<bool, _>(index).ok().map(Value::Bool),
        "INT2" => row.try_get::<i16, _>(index).ok().map(|v| Value::Int(v.into())),
        "INT4" => row.try_get::<i32, _>(index).ok().map(|v| Value::Int(v.into())),
        "INT8" => row.try_get::<i64, _>(index).ok().map(Value::Int),
        "FLOAT4" => row
            .try_get::<f32, _>(index)
            .ok()
            .map(|v| Value::Float(v.into())),
        "FLOAT8" => row.try_get::<f64, _>(index).ok().map(Value::Float),
        "NUMERIC" => row
            .try_get::<Decimal, _>(index)
            .ok()
            .map(|v| Value::String(v.to_string())),
        "BYTEA" => row.try_get::<Vec<u8>, _>(index).ok().map(Value::Bytes),
        "UUID" => row
            .try_get::<Uuid, _>(index)
            .ok()
            .map(|v| Value::String(v.to_string())),
        "DATE" => row
            .try_get::<NaiveDate, _>(index)
            .ok()
            .map(|v| Value::String(v.to_string())),
        "TIME" => row
            .try_get::<NaiveTime, _>(index)
            .ok()
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(index)
            .ok()
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .ok()
            .map(|v| Value::String(v.to_rfc3339())),
        "JSON" | "JSONB" => row.try_get::<JsonValue, _>(index).ok().map(Value::Json),
        _ => row.try_get::<String, _>(index).ok().map(Value::String),
    };

    decoded.unwrap_or_else(|| Value::String(format!("<{}>", type_name.to_lowercase())))
}

/// True when every connection the pool may hold is open and checked out.
fn pool_saturated(pool: &PgPool) -> bool {
    pool.num_idle() == 0 && pool.size() >= pool.options().get_max_connections()
}

/// Determines if a connection error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("08") || code == "57P03"),
        _ => {
            let error_str = error.to_string().to_lowercase();
            error_str.contains("connection refused")
                || error_str.contains("timed out")
                || error_str.contains("connection reset")
        }
    }
}

/// Maps sqlx connection errors to messages that never include credentials.
fn map_connection_error(error: sqlx::Error, config: &DatabaseConfig) -> AskError {
    let target = config
        .url
        .as_deref()
        .and_then(|url| ConnectionConfig::from_connection_string(url).ok())
        .unwrap_or_else(|| config.connection.clone());
    let host = target.host.as_deref().unwrap_or("localhost");
    let port = target.port;
    let user = target.user.as_deref().unwrap_or("unknown");
    let database = target.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        AskError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        AskError::connection(format!("Authentication failed for user '{user}'."))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        AskError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        AskError::connection(format!("Connection to {host}:{port} timed out."))
    } else {
        AskError::connection(format!("Cannot connect to {host}:{port}."))
    }
}

/// Maps a sqlx error raised while running a statement to the error taxonomy.
fn map_query_error(error: sqlx::Error) -> AskError {
    match error {
        sqlx::Error::PoolTimedOut => AskError::busy("no database connection became available"),
        sqlx::Error::PoolClosed => AskError::connection("connection pool is closed"),
        sqlx::Error::Io(e) => AskError::connection(format!("database I/O failure: {e}")),
        sqlx::Error::Tls(_) => AskError::connection("TLS negotiation with the database failed"),
        sqlx::Error::Protocol(_) => AskError::connection("database protocol error"),
        sqlx::Error::Database(db) => {
            let code = db.code();
            warn!(
                sqlstate = code.as_deref().unwrap_or("?"),
                message = db.message(),
                "Statement failed"
            );
            summarize_database_error(code.as_deref())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            AskError::execution("could not decode a result value")
        }
        other => AskError::internal(format!("unexpected database error: {other}")),
    }
}

/// Summarizes a database error by SQLSTATE without echoing server text.
pub fn summarize_database_error(code: Option<&str>) -> AskError {
    let Some(code) = code else {
        return AskError::execution("the database rejected the statement");
    };

    let summary = match code {
        "57014" => {
            return AskError::execution_timeout("statement exceeded the configured timeout")
        }
        "53300" => return AskError::busy("database has no free connection slots"),
        "57P01" | "57P02" | "57P03" => {
            return AskError::connection("database is not accepting connections")
        }
        c if c.starts_with("08") => {
            return AskError::connection(format!("connection failure (SQLSTATE {c})"))
        }
        "25006" => "statement attempted to write inside a read-only transaction",
        "42P01" => "referenced table does not exist",
        "42703" => "referenced column does not exist",
        "42702" => "ambiguous column reference",
        "42601" => "syntax error in generated statement",
        "42883" => "referenced function or operator does not exist",
        "42803" => "invalid use of grouping or aggregate",
        "42804" => "type mismatch in statement",
        "42501" => "insufficient privilege",
        c if c.starts_with("22") => "data exception",
        _ => "the database rejected the statement",
    };

    AskError::execution(format!("{summary} (SQLSTATE {code})"))
}

//! Read-only execution against a live PostgreSQL.
//!
//! Statements are self-contained (no seeded tables needed).

use std::time::Duration;

use db_ask::config::DatabaseConfig;
use db_ask::db::{DatabaseClient, ExecutionLimits, PostgresClient, Value};
use db_ask::error::ErrorKind;
use db_ask::query::QueryExecutor;
use db_ask::safety::gate;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create a test client.
async fn get_test_client() -> Option<PostgresClient> {
    let url = get_test_database_url()?;
    let config = DatabaseConfig {
        url: Some(url),
        connect_attempts: 1,
        ..Default::default()
    };
    PostgresClient::connect(&config).await.ok()
}

fn limits(row_cap: usize) -> ExecutionLimits {
    ExecutionLimits::new(Duration::from_secs(5), row_cap)
}

#[tokio::test]
async fn test_five_rows_in_column_order() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let sql =
        gate("SELECT 'row ' || n AS zeta, n AS alpha FROM generate_series(1, 5) AS n").unwrap();
    let result = client.execute_read_only(&sql, &limits(100)).await.unwrap();

    assert_eq!(result.rows.len(), 5);
    assert_eq!(result.columns, vec!["zeta".to_string(), "alpha".to_string()]);
    assert!(!result.truncated);

    let records = serde_json::to_string(&result.records()).unwrap();
    assert!(records.starts_with(r#"[{"zeta":"row 1","alpha":1}"#));

    client.close().await;
}

#[tokio::test]
async fn test_row_cap_truncates() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let sql = gate("SELECT n FROM generate_series(1, 50) AS n").unwrap();
    let result = client.execute_read_only(&sql, &limits(10)).await.unwrap();

    assert_eq!(result.row_count(), 10);
    assert!(result.truncated);

    let exact = client.execute_read_only(&sql, &limits(50)).await.unwrap();
    assert_eq!(exact.row_count(), 50);
    assert!(!exact.truncated);

    client.close().await;
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let sql = gate("SELECT 1 AS one, 'x' AS two WHERE false").unwrap();
    let result = client.execute_read_only(&sql, &limits(10)).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(result.columns, vec!["one".to_string(), "two".to_string()]);

    client.close().await;
}

#[tokio::test]
async fn test_value_conversion() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let sql = gate(
        "SELECT true AS flag, 42::int8 AS big, 1.5::float8 AS ratio, 12.50::numeric AS price, \
         DATE '2024-01-02' AS day, '{\"a\": [1, 2]}'::jsonb AS doc, NULL::text AS missing, \
         'hi'::bytea AS raw",
    )
    .unwrap();
    let result = client.execute_read_only(&sql, &limits(10)).await.unwrap();
    let row = &result.rows[0];

    assert_eq!(row[0], Value::Bool(true));
    assert_eq!(row[1], Value::Int(42));
    assert_eq!(row[2], Value::Float(1.5));
    assert_eq!(row[3], Value::String("12.50".to_string()));
    assert_eq!(row[4], Value::String("2024-01-02".to_string()));
    assert_eq!(row[5], Value::Json(json!({"a": [1, 2]})));
    assert!(row[6].is_null());
    assert_eq!(serde_json::to_value(&row[7]).unwrap(), json!("aGk="));

    client.close().await;
}

#[tokio::test]
async fn test_statement_timeout() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let executor = QueryExecutor::new(
        Arc::new(client.clone()),
        ExecutionLimits::new(Duration::from_millis(200), 10),
    );
    let sql = gate("SELECT pg_sleep(5)").unwrap();
    let err = executor.execute(&sql).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExecutionTimeout);

    client.close().await;
}

#[tokio::test]
async fn test_unknown_table_is_summarized() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let sql = gate("SELECT * FROM nonexistent_table_xyz_123").unwrap();
    let err = client.execute_read_only(&sql, &limits(10)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExecutionError);
    assert!(err.to_string().contains("42P01"), "got: {err}");
    assert!(!err.to_string().contains("nonexistent_table_xyz_123"));

    client.close().await;
}

#[tokio::test]
async fn test_syntax_error_is_execution_error() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let sql = gate("SELECT FROM WHERE").unwrap();
    let err = client.execute_read_only(&sql, &limits(10)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionError);

    client.close().await;
}

#[tokio::test]
async fn test_writes_fail_inside_read_only_transaction() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    // SELECT INTO creates a table yet passes the lexical gate.
    let sql = gate("SELECT 1 AS x INTO db_ask_probe_table").unwrap();
    let err = client.execute_read_only(&sql, &limits(10)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExecutionError);

    let probe = gate("SELECT to_regclass('db_ask_probe_table') IS NULL AS absent").unwrap();
    let result = client.execute_read_only(&probe, &limits(1)).await.unwrap();
    assert_eq!(result.rows[0][0], Value::Bool(true));

    client.close().await;
}

#[tokio::test]
async fn test_ping() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    client.ping().await.unwrap();
    client.close().await;
}

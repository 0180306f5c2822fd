//! Schema introspection integration tests.
//!
//! Creates two small tables in `public` (idempotently) and checks they come
//! back with keys and relationships.

use db_ask::config::DatabaseConfig;
use db_ask::db::{DatabaseClient, PostgresClient};
use sqlx::postgres::PgPoolOptions;

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Creates the fixture tables and returns a client for the same database.
async fn get_test_client() -> Option<PostgresClient> {
    let url = get_test_database_url()?;

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .ok()?;
    for stmt in [
        "CREATE TABLE IF NOT EXISTS db_ask_it_customers (id serial PRIMARY KEY, name text NOT NULL, note text)",
        "CREATE TABLE IF NOT EXISTS db_ask_it_invoices (id serial PRIMARY KEY, customer_id int NOT NULL REFERENCES db_ask_it_customers(id), total numeric(10, 2))",
    ] {
        sqlx::query(stmt).execute(&pool).await.ok()?;
    }
    pool.close().await;

    let config = DatabaseConfig {
        url: Some(url),
        connect_attempts: 1,
        ..Default::default()
    };
    PostgresClient::connect(&config).await.ok()
}

#[tokio::test]
async fn test_introspect_tables_and_columns() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let schema = client.introspect_schema().await.unwrap();

    let customers = schema
        .tables
        .iter()
        .find(|t| t.name == "db_ask_it_customers")
        .expect("customers table introspected");
    let names: Vec<&str> = customers.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "note"]);
    assert_eq!(customers.primary_key, vec!["id".to_string()]);
    assert!(!customers.columns[1].is_nullable);
    assert!(customers.columns[2].is_nullable);

    client.close().await;
}

#[tokio::test]
async fn test_introspect_foreign_keys() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let schema = client.introspect_schema().await.unwrap();
    let fk = schema
        .foreign_keys
        .iter()
        .find(|fk| fk.from_table == "db_ask_it_invoices")
        .expect("invoice foreign key introspected");

    assert_eq!(fk.from_columns, vec!["customer_id".to_string()]);
    assert_eq!(fk.to_table, "db_ask_it_customers");
    assert_eq!(fk.to_columns, vec!["id".to_string()]);

    let hint = schema.format_for_llm();
    assert!(hint.contains("Table: db_ask_it_invoices"));
    assert!(hint.contains("db_ask_it_invoices.customer_id -> db_ask_it_customers.id"));

    client.close().await;
}

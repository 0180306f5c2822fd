//! Integration tests for db-ask.

pub mod http_test;
pub mod ollama_test;
pub mod query_test;
pub mod schema_test;

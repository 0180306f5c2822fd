//! db-ask - natural-language questions over PostgreSQL through a local model.
//!
//! A question is turned into SQL by an Ollama model, the SQL passes a
//! SELECT-only gate, and the gated statement runs read-only with a timeout
//! and a row cap. This library exposes the core modules for the binary and
//! for integration tests.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod query;
pub mod safety;
pub mod server;

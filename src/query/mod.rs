//! Query execution for db-ask.
//!
//! Isolates bounded execution of approved statements from the request
//! pipeline.

pub mod executor;

pub use executor::QueryExecutor;

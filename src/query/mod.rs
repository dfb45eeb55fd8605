//! Query execution for db-chores.
//!
//! Isolates statement execution from argument handling and reporting so it
//! can be tested against a mock connection.

pub mod executor;

pub use executor::QueryExecutor;

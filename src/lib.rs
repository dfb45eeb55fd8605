//! db-chores - one-shot raw SQL maintenance tasks.
//!
//! Each invocation validates its arguments, opens one connection, runs one
//! parameterized statement, reports the result and releases the connection.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
pub mod report;
pub mod runner;
pub mod task;

/// Name of the installed binary, used in usage lines.
pub const BIN_NAME: &str = "dbchore";

//! Statement execution for a resolved task invocation.
//!
//! Picks the statement text for the connection's dialect, sends it with the
//! invocation's bound parameters and shapes the answer by statement kind.
//! Errors are returned as-is: nothing here retries or recovers.

use std::time::Instant;

use tracing::debug;

use crate::db::{DatabaseClient, ResultSet};
use crate::error::Result;
use crate::task::{StatementKind, TaskInvocation};

/// Runs invocations against one borrowed connection.
pub struct QueryExecutor<'a> {
    db: &'a mut dyn DatabaseClient,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new query executor.
    pub fn new(db: &'a mut dyn DatabaseClient) -> Self {
        Self { db }
    }

    /// Executes the invocation's statement.
    ///
    /// Queries yield [`ResultSet::Rows`] and mutations yield
    /// [`ResultSet::AffectedCount`]; empty rows and a zero count are both
    /// successful results.
    pub async fn execute(&mut self, invocation: &TaskInvocation) -> Result<ResultSet> {
        let sql = invocation.sql(self.db.backend());
        let params = invocation.params();
        let start = Instant::now();

        debug!(
            task = invocation.task(),
            kind = invocation.kind().as_str(),
            params = params.len(),
            "Executing statement"
        );

        let result = match invocation.kind() {
            StatementKind::Query => ResultSet::Rows(self.db.fetch_rows(sql, params).await?),
            StatementKind::Mutation if invocation.is_atomic() => {
                ResultSet::AffectedCount(self.db.execute_atomic(sql, params).await?)
            }
            StatementKind::Mutation => {
                ResultSet::AffectedCount(self.db.execute(sql, params).await?)
            }
        };

        debug!(task = invocation.task(), elapsed = ?start.elapsed(), "Statement finished");
        Ok(result)
    }
}

//! Mock database client and provider for testing.
//!
//! The client returns canned results and records every statement it receives;
//! the provider counts acquisitions and releases so lifecycle guarantees can be
//! asserted without a server.

use super::{close_client, ConnectionProvider, DatabaseBackend, DatabaseClient, RowSet, Value};
use crate::error::{ReleaseWarning, Result, TaskError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A statement as seen by the mock client.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub atomic: bool,
}

/// A mock database client that returns predefined results.
#[derive(Debug, Clone)]
pub struct MockDatabaseClient {
    backend: DatabaseBackend,
    rows: RowSet,
    affected: u64,
    query_error: Option<String>,
    fail_close: bool,
    closed: bool,
    log: Arc<Mutex<Vec<RecordedStatement>>>,
}

impl MockDatabaseClient {
    /// Creates a client that returns no rows and zero affected rows.
    pub fn new() -> Self {
        Self {
            backend: DatabaseBackend::Postgres,
            rows: RowSet::default(),
            affected: 0,
            query_error: None,
            fail_close: false,
            closed: false,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Rows returned by every query.
    pub fn with_rows(mut self, rows: RowSet) -> Self {
        self.rows = rows;
        self
    }

    /// Count returned by every mutation.
    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    /// Makes every statement fail with a query error.
    pub fn with_query_error(mut self, message: impl Into<String>) -> Self {
        self.query_error = Some(message.into());
        self
    }

    /// Makes `close` fail.
    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn with_backend(mut self, backend: DatabaseBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Statements received so far, shared with clones of this client.
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn record(&self, sql: &str, params: &[Value], atomic: bool) -> Result<()> {
        if self.closed {
            return Err(TaskError::internal("connection already released"));
        }
        if let Ok(mut log) = self.log.lock() {
            log.push(RecordedStatement {
                sql: sql.to_string(),
                params: params.to_vec(),
                atomic,
            });
        }
        match &self.query_error {
            Some(message) => Err(TaskError::query(message.clone())),
            None => Ok(()),
        }
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> Result<RowSet> {
        self.record(sql, params, false)?;
        Ok(self.rows.clone())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql, params, false)?;
        Ok(self.affected)
    }

    async fn execute_atomic(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql, params, true)?;
        Ok(self.affected)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.fail_close {
            return Err(TaskError::connection("mock close failure"));
        }
        Ok(())
    }
}

/// Counters shared between a [`MockConnectionProvider`] and the test.
#[derive(Debug, Default)]
pub struct ProviderStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl ProviderStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Provider handing out clones of a template [`MockDatabaseClient`].
#[derive(Debug, Clone)]
pub struct MockConnectionProvider {
    template: MockDatabaseClient,
    acquire_error: Option<String>,
    stats: Arc<ProviderStats>,
}

impl MockConnectionProvider {
    pub fn new(template: MockDatabaseClient) -> Self {
        Self {
            template,
            acquire_error: None,
            stats: Arc::new(ProviderStats::default()),
        }
    }

    /// A provider whose store is unreachable.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            acquire_error: Some(message.into()),
            ..Self::new(MockDatabaseClient::new())
        }
    }

    pub fn stats(&self) -> Arc<ProviderStats> {
        Arc::clone(&self.stats)
    }

    /// Statements executed by any client this provider handed out.
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.template.statements()
    }
}

#[async_trait]
impl ConnectionProvider for MockConnectionProvider {
    async fn acquire(&self) -> Result<Box<dyn DatabaseClient>> {
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        match &self.acquire_error {
            Some(message) => Err(TaskError::connection(message.clone())),
            None => Ok(Box::new(self.template.clone())),
        }
    }

    async fn release(
        &self,
        client: Box<dyn DatabaseClient>,
    ) -> std::result::Result<(), ReleaseWarning> {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
        close_client(client).await
    }
}

//! Database abstraction layer for db-chores.
//!
//! Provides a trait-based interface for single-connection database access and
//! the provider that acquires and releases that connection for one invocation.

mod mock;
mod postgres;
mod sqlite;
mod types;

pub use mock::{MockConnectionProvider, MockDatabaseClient, ProviderStats, RecordedStatement};
pub use postgres::PostgresClient;
pub use sqlite::SqliteClient;
pub use types::{ColumnInfo, Record, ResultSet, Row, RowSet, Value};

use crate::config::{ConnectionConfig, RunnerConfig};
use crate::error::{ReleaseWarning, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a string or URL scheme.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the default port for this backend (0 when not networked).
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Sqlite => 0,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Opens a single connection for the given backend and configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(
    config: &ConnectionConfig,
    runner: &RunnerConfig,
) -> Result<Box<dyn DatabaseClient>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(config, runner).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Sqlite => {
            let client = SqliteClient::connect(config, runner).await?;
            Ok(Box::new(client))
        }
    }
}

/// One live, exclusively owned connection to the store.
///
/// Statements take their values as positionally bound parameters
/// (`$1`, `$2`, ...); implementations never splice values into SQL text.
#[async_trait]
pub trait DatabaseClient: Send {
    /// The backend this connection talks to, used to pick the SQL dialect.
    fn backend(&self) -> DatabaseBackend;

    /// Runs a row-returning statement.
    async fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> Result<RowSet>;

    /// Runs a mutating statement and returns the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Like [`execute`](Self::execute), inside an explicit transaction.
    async fn execute_atomic(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Closes the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Produces and reclaims the connection of one invocation.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Opens a fresh connection.
    async fn acquire(&self) -> Result<Box<dyn DatabaseClient>>;

    /// Closes a connection obtained from [`acquire`](Self::acquire).
    ///
    /// Never fails outright: a close error is logged and handed back as a
    /// warning so it cannot replace the invocation's outcome.
    async fn release(
        &self,
        client: Box<dyn DatabaseClient>,
    ) -> std::result::Result<(), ReleaseWarning> {
        close_client(client).await
    }
}

/// Closes a client, downgrading any failure to a logged warning.
pub async fn close_client(
    mut client: Box<dyn DatabaseClient>,
) -> std::result::Result<(), ReleaseWarning> {
    match client.close().await {
        Ok(()) => {
            debug!("Connection released");
            Ok(())
        }
        Err(e) => {
            warn!("Failed to release connection: {e}");
            Err(ReleaseWarning(e.to_string()))
        }
    }
}

/// Provider backed by a real PostgreSQL or SQLite server.
#[derive(Debug, Clone)]
pub struct DatabaseProvider {
    config: ConnectionConfig,
    runner: RunnerConfig,
}

impl DatabaseProvider {
    pub fn new(config: ConnectionConfig, runner: RunnerConfig) -> Self {
        Self { config, runner }
    }
}

#[async_trait]
impl ConnectionProvider for DatabaseProvider {
    async fn acquire(&self) -> Result<Box<dyn DatabaseClient>> {
        info!("Connecting to {}", self.config.display_string());
        connect(&self.config, &self.runner).await
    }
}

/// Provider that resolves its connection settings on first use.
///
/// Config files, env files and URLs are only read once a connection is
/// actually needed, so argument validation always comes first.
pub struct ResolvingProvider<F> {
    resolve: F,
}

impl<F> ResolvingProvider<F>
where
    F: Fn() -> Result<DatabaseProvider> + Send + Sync,
{
    pub fn new(resolve: F) -> Self {
        Self { resolve }
    }
}

#[async_trait]
impl<F> ConnectionProvider for ResolvingProvider<F>
where
    F: Fn() -> Result<DatabaseProvider> + Send + Sync,
{
    async fn acquire(&self) -> Result<Box<dyn DatabaseClient>> {
        let provider = (self.resolve)()?;
        provider.acquire().await
    }
}

/// Formats a statement error with Postgres detail fields if available.
pub(crate) fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }

        if let Some(table) = pg_error.table() {
            result.push_str("\n  TABLE: ");
            result.push_str(table);
        }

        if let Some(column) = pg_error.column() {
            result.push_str("\n  COLUMN: ");
            result.push_str(column);
        }

        if let Some(constraint) = pg_error.constraint() {
            result.push_str("\n  CONSTRAINT: ");
            result.push_str(constraint);
        }
    } else if let Some(code) = db_error.code() {
        result.push_str(&format!(" (code {code})"));
    }

    result
}

//! SQLite database client implementation.
//!
//! Implements `DatabaseClient` over a single sqlx `SqliteConnection`. SQLite
//! accepts the same `$N` placeholders as PostgreSQL, so task templates only
//! diverge where the dialects do.

use crate::config::{ConnectionConfig, RunnerConfig};
use crate::db::{
    format_query_error, ColumnInfo, DatabaseBackend, DatabaseClient, Row, RowSet, Value,
};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Column as SqlxColumn, Connection, Row as SqlxRow, Sqlite, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::debug;

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    conn: Option<SqliteConnection>,
    statement_timeout: Duration,
}

impl SqliteClient {
    /// Opens the database file named by the config.
    pub async fn connect(config: &ConnectionConfig, runner: &RunnerConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let timeout = runner.connect_timeout();

        let conn = tokio::time::timeout(timeout, SqliteConnection::connect(&conn_str))
            .await
            .map_err(|_| {
                TaskError::connection(format!(
                    "Opening {} timed out after {} seconds",
                    config.display_string(),
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                TaskError::connection(format!(
                    "Cannot open {}: {e}",
                    config.display_string()
                ))
            })?;

        debug!("Opened SQLite database");
        Ok(Self {
            conn: Some(conn),
            statement_timeout: runner.statement_timeout(),
        })
    }

    fn conn_mut(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| TaskError::internal("connection already released"))
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> Result<RowSet> {
        let timeout = self.statement_timeout;
        let conn = self.conn_mut()?;

        let query = params.iter().fold(sqlx::query(sql), bind_value);
        let result = tokio::time::timeout(timeout, query.fetch_all(&mut *conn))
            .await
            .map_err(|_| statement_timed_out(timeout))?
            .map_err(|e| TaskError::query(format_query_error(e)))?;

        let columns: Vec<ColumnInfo> = result
            .first()
            .map(|first_row| {
                first_row
                    .columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        let rows: Vec<Row> = result.iter().map(convert_row).collect();
        Ok(RowSet::with_data(columns, rows))
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let timeout = self.statement_timeout;
        let conn = self.conn_mut()?;

        let query = params.iter().fold(sqlx::query(sql), bind_value);
        let done = tokio::time::timeout(timeout, query.execute(&mut *conn))
            .await
            .map_err(|_| statement_timed_out(timeout))?
            .map_err(|e| TaskError::query(format_query_error(e)))?;

        Ok(done.rows_affected())
    }

    async fn execute_atomic(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let timeout = self.statement_timeout;
        let conn = self.conn_mut()?;

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| TaskError::query(format_query_error(e)))?;

        let query = params.iter().fold(sqlx::query(sql), bind_value);
        let done = tokio::time::timeout(timeout, query.execute(&mut *tx))
            .await
            .map_err(|_| statement_timed_out(timeout))?
            .map_err(|e| TaskError::query(format_query_error(e)))?;

        tx.commit()
            .await
            .map_err(|e| TaskError::query(format_query_error(e)))?;

        Ok(done.rows_affected())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| TaskError::connection(format!("Failed to close connection: {e}")))?;
        }
        Ok(())
    }
}

fn statement_timed_out(timeout: Duration) -> TaskError {
    TaskError::query(format!(
        "Statement timed out after {} seconds",
        timeout.as_secs()
    ))
}

/// Binds one parameter. UUIDs and decimals are bound as text.
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Decimal(d) => query.bind(d.to_string()),
        Value::String(s) | Value::Timestamp(s) => query.bind(s.as_str()),
        Value::Uuid(u) => query.bind(u.to_string()),
        Value::Bytes(b) => query.bind(b.as_slice()),
    }
}

fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Decodes by the storage class of the stored value, since SQLite columns
/// are not strictly typed.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match storage.as_str() {
        "INTEGER" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get_unchecked::<bool, _>(index)
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! over a single sqlx `PgConnection`.

use crate::config::{ConnectionConfig, RunnerConfig};
use crate::db::{
    format_query_error, ColumnInfo, DatabaseBackend, DatabaseClient, Row, RowSet, Value,
};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column as SqlxColumn, Connection, Postgres, Row as SqlxRow, TypeInfo};
use std::time::{Duration, Instant};
use tracing::debug;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    conn: Option<PgConnection>,
    statement_timeout: Duration,
}

impl PostgresClient {
    /// Opens one connection. No retries: a failed handshake is final.
    pub async fn connect(config: &ConnectionConfig, runner: &RunnerConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let timeout = runner.connect_timeout();

        let conn = tokio::time::timeout(timeout, PgConnection::connect(&conn_str))
            .await
            .map_err(|_| {
                TaskError::connection(format!(
                    "Connection to {} timed out after {} seconds",
                    config.display_string(),
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| map_connection_error(e, config))?;

        debug!("Successfully connected to database");
        Ok(Self {
            conn: Some(conn),
            statement_timeout: runner.statement_timeout(),
        })
    }

    fn conn_mut(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| TaskError::internal("connection already released"))
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> Result<RowSet> {
        let timeout = self.statement_timeout;
        let conn = self.conn_mut()?;
        let start = Instant::now();

        let query = params.iter().fold(sqlx::query(sql), bind_value);
        let result = tokio::time::timeout(timeout, query.fetch_all(&mut *conn))
            .await
            .map_err(|_| statement_timed_out(timeout))?
            .map_err(|e| TaskError::query(format_query_error(e)))?;

        debug!("Fetched {} rows in {:?}", result.len(), start.elapsed());

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
        // Dropping `tx` on any early return rolls the statement back.
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

/// Binds one parameter with its native Postgres type.
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Decimal(d) => query.bind(*d),
        Value::String(s) | Value::Timestamp(s) => query.bind(s.as_str()),
        Value::Uuid(u) => query.bind(*u),
        Value::Bytes(b) => query.bind(b.as_slice()),
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)
            .ok()
            .flatten()
            .map(Value::Uuid)
            .unwrap_or(Value::Null),

        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|ts| Value::Timestamp(ts.to_rfc3339()))
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|ts| Value::Timestamp(ts.to_string()))
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|d| Value::Timestamp(d.to_string()))
            .unwrap_or(Value::Null),

        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        "NUMERIC" | "DECIMAL" => match row.try_get::<Option<rust_decimal::Decimal>, _>(index) {
            Ok(value) => value.map(Value::Decimal).unwrap_or(Value::Null),
            // Beyond 28 significant digits.
            Err(_) => undecodable(type_name),
        },

        // Text-like types decode as strings; anything else is shown by type.
        _ => match row.try_get::<Option<String>, _>(index) {
            Ok(value) => value.map(Value::String).unwrap_or(Value::Null),
            Err(_) => undecodable(type_name),
        },
    }
}

/// Placeholder for a non-NULL value no decoder handles, so it is never
/// mistaken for NULL.
fn undecodable(type_name: &str) -> Value {
    Value::String(format!("<{}>", type_name.to_lowercase()))
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> TaskError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        TaskError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        TaskError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        TaskError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        TaskError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        TaskError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        TaskError::connection(error.to_string())
    }
}

//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using a single sqlx connection.

use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{AuditError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{
    Column as SqlxColumn, ConnectOptions, Connection, Executor, Postgres, Row as SqlxRow,
    Statement, TypeInfo, ValueRef,
};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Seconds to wait for the server before giving up on a target.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    conn: Option<PgConnection>,
}

impl PostgresClient {
    /// Opens a connection using the given configuration.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let options = PgConnectOptions::from_str(&conn_str)
            .map_err(|e| AuditError::config(format!("Invalid connection settings: {e}")))?;

        let conn = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            options.connect(),
        )
        .await
        .map_err(|_| {
            AuditError::connection(format!(
                "Connection to {} timed out. The server may be overloaded or unreachable.",
                config.display_string()
            ))
        })?
        .map_err(|e| map_connection_error(e, config))?;

        debug!("Connected to {}", config.display_string());
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| AuditError::internal("Connection already closed"))
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        let conn = self.conn()?;
        let start = Instant::now();

        // Describe first so the header is known even when no rows come back
        let statement = (&mut *conn)
            .prepare(sql)
            .await
            .map_err(|e| AuditError::query(format_query_error(e)))?;
        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect();

        // Simple protocol, so every value arrives in text format
        let rows = (&mut *conn)
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(|e| AuditError::query(format_query_error(e)))?;
        let rows: Vec<Row> = rows.iter().map(convert_row).collect();

        Ok(QueryResult::with_data(columns, rows).with_execution_time(start.elapsed()))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| AuditError::connection(format!("Failed to close connection: {e}")))?;
        }
        Ok(())
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

fn get<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

/// Converts a single column value from a PgRow to our Value type.
///
/// Rows are fetched over the simple protocol, so types without a match arm
/// (numeric, uuid, interval, json, inet, arrays) are read as the server's
/// own text rendering. `<TYPE>` is left only for values that are not valid
/// UTF-8 text.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let is_null = row
        .try_get_raw(index)
        .map(|raw| raw.is_null())
        .unwrap_or(true);
    if is_null {
        return Value::Null;
    }

    let upper = type_name.to_uppercase();
    let value = match upper.as_str() {
        "BOOL" | "BOOLEAN" => get::<bool>(row, index).map(Value::from),
        "INT2" | "SMALLINT" => get::<i16>(row, index).map(|v| Value::Int(v.into())),
        "INT4" | "INT" | "INTEGER" => get::<i32>(row, index).map(Value::from),
        "INT8" | "BIGINT" => get::<i64>(row, index).map(Value::from),
        "FLOAT4" | "REAL" => get::<f32>(row, index).map(|v| Value::Float(v.into())),
        "FLOAT8" | "DOUBLE PRECISION" => get::<f64>(row, index).map(Value::from),
        "TIMESTAMP" => get::<NaiveDateTime>(row, index).map(|v| Value::from(v.to_string())),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, index).map(|v| Value::from(v.to_string())),
        "DATE" => get::<NaiveDate>(row, index).map(|v| Value::from(v.to_string())),
        "TIME" => get::<NaiveTime>(row, index).map(|v| Value::from(v.to_string())),
        "BYTEA" => get::<Vec<u8>>(row, index).map(Value::from),
        _ => None,
    };

    value
        .or_else(|| {
            row.try_get_unchecked::<&str, _>(index)
                .ok()
                .map(Value::from)
        })
        .unwrap_or_else(|| {
            debug!("Cannot decode column {index} of type {type_name}; cast it to text in the query");
            Value::String(format!("<{upper}>"))
        })
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> AuditError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = &config.database;

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        AuditError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        AuditError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        AuditError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        AuditError::connection(
            "Server requires SSL. Add '?sslmode=require' to the endpoint.".to_string(),
        )
    } else {
        AuditError::connection(format!("{host}:{port}/{database}: {error}"))
    }
}

/// Formats a query error with PostgreSQL detail and hint if available.
fn format_query_error(error: sqlx::Error) -> String {
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
    }

    result
}

//! SQLite database client implementation.
//!
//! Opens the database file read-only; a missing file is a connection error.

use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{AuditError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{
    Column as SqlxColumn, ConnectOptions, Connection, Executor, Row as SqlxRow, Sqlite, Statement,
    TypeInfo, ValueRef,
};
use std::time::Instant;
use tracing::debug;

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    conn: Option<SqliteConnection>,
}

impl SqliteClient {
    /// Opens the database file named by `config.database`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn = SqliteConnectOptions::new()
            .filename(&config.database)
            .read_only(true)
            .create_if_missing(false)
            .connect()
            .await
            .map_err(|e| {
                AuditError::connection(format!("Cannot open {}: {e}", config.display_string()))
            })?;

        debug!("Opened {}", config.display_string());
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| AuditError::internal("Connection already closed"))
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        let conn = self.conn()?;
        let start = Instant::now();

        let statement = (&mut *conn)
            .prepare(sql)
            .await
            .map_err(|e| AuditError::query(e.to_string()))?;
        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect();

        let rows = sqlx::query(sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AuditError::query(e.to_string()))?;
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

fn convert_row(row: &SqliteRow) -> Row {
    (0..row.len()).map(|i| convert_value(row, i)).collect()
}

fn get<'r, T>(row: &'r SqliteRow, index: usize) -> Option<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get::<T, _>(index).ok()
}

/// SQLite columns are dynamically typed, so decode by the storage class of
/// the value itself rather than the declared column type.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    let value = match storage_class.as_str() {
        "INTEGER" => get::<i64>(row, index).map(Value::from),
        "REAL" => get::<f64>(row, index).map(Value::from),
        "BLOB" => get::<Vec<u8>>(row, index).map(Value::from),
        "BOOLEAN" => get::<bool>(row, index).map(Value::from),
        _ => get::<String>(row, index).map(Value::from),
    };

    value.unwrap_or_else(|| {
        debug!("Cannot decode column {index} with storage class {storage_class}");
        Value::String(format!("<{storage_class}>"))
    })
}

//! SQLite database client implementation.
//!
//! Provides the `SqliteClient` struct, a single exclusively-owned connection to
//! a (sandboxed) SQLite file, using sqlx.

use crate::db::{ColumnInfo, ResultSet, Row, Value};
use crate::error::{EvalError, Result};
use futures::FutureExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as _, ConnectOptions, Connection, Executor, Row as _, Statement as _};
use sqlx::{TypeInfo, ValueRef};
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Number of virtual machine instructions between cancellation checks.
const PROGRESS_CHECK_OPS: i32 = 1000;

/// How long SQLite waits on a locked database before giving up.
const BUSY_TIMEOUT_SECS: u64 = 5;

/// A single SQLite connection.
#[derive(Debug)]
pub struct SqliteClient {
    conn: SqliteConnection,
}

impl SqliteClient {
    /// Opens a connection to an existing SQLite file.
    pub async fn open(path: &Path) -> Result<Self> {
        let conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))
            .connect()
            .await
            .map_err(|e| {
                EvalError::sandbox(format!("Failed to open {}: {e}", path.display()))
            })?;

        debug!("Opened SQLite connection to {}", path.display());
        Ok(Self { conn })
    }

    /// Interrupts any statement running on this connection once `token` is cancelled.
    pub async fn interrupt_on(&mut self, token: CancellationToken) -> Result<()> {
        let mut handle = self
            .conn
            .lock_handle()
            .await
            .map_err(|e| EvalError::internal(format!("Failed to lock SQLite handle: {e}")))?;
        handle.set_progress_handler(PROGRESS_CHECK_OPS, move || !token.is_cancelled());
        Ok(())
    }

    /// Executes one or more statements, discarding any rows they produce.
    pub async fn execute_script(&mut self, sql: &str) -> Result<()> {
        (&mut self.conn)
            .execute(sqlx::raw_sql(sql))
            .boxed()
            .await
            .map_err(|e| EvalError::query(format_query_error(e)))?;
        Ok(())
    }

    /// Returns true if `sql` produces a tabular result (has output columns).
    pub async fn is_tabular(&mut self, sql: &str) -> Result<bool> {
        let statement = (&mut self.conn)
            .prepare(sql)
            .boxed()
            .await
            .map_err(|e| EvalError::query(format_query_error(e)))?;
        Ok(!statement.columns().is_empty())
    }

    /// Executes a query and fetches every row it produces.
    pub async fn fetch_all(&mut self, sql: &str) -> Result<ResultSet> {
        let start = Instant::now();

        let statement = (&mut self.conn)
            .prepare(sql)
            .boxed()
            .await
            .map_err(|e| EvalError::query(format_query_error(e)))?;

        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect();

        let rows: Vec<SqliteRow> = statement
            .query()
            .fetch_all(&mut self.conn)
            .boxed()
            .await
            .map_err(|e| EvalError::query(format_query_error(e)))?;

        let rows: Vec<Row> = rows.iter().map(convert_row).collect();

        Ok(ResultSet::with_data(columns, rows).with_execution_time(start.elapsed()))
    }

    /// Creates `table` with the columns of `result` and inserts its rows.
    ///
    /// Columns are untyped so every value keeps its storage class. Repeated or
    /// empty column names are made unique the way `CREATE TABLE .. AS` does.
    pub async fn create_table_from(&mut self, table: &str, result: &ResultSet) -> Result<()> {
        let columns = unique_column_names(&result.columns);
        let definition = columns
            .iter()
            .map(|name| quote_identifier(name))
            .collect::<Vec<_>>()
            .join(", ");
        self.execute_script(&format!("CREATE TABLE {} ({definition})", quote_identifier(table)))
            .await?;

        if result.rows.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let insert = format!("INSERT INTO {} VALUES ({placeholders})", quote_identifier(table));
        for row in &result.rows {
            let mut query = sqlx::query(&insert);
            for value in row {
                query = match value {
                    Value::Null => query.bind(None::<i64>),
                    Value::Bool(b) => query.bind(*b),
                    Value::Int(i) => query.bind(*i),
                    Value::Float(f) => query.bind(*f),
                    Value::String(s) => query.bind(s.clone()),
                    Value::Bytes(b) => query.bind(b.clone()),
                    Value::List(_) => query.bind(value.to_display_string()),
                };
            }
            query
                .execute(&mut self.conn)
                .boxed()
                .await
                .map_err(|e| EvalError::query(format_query_error(e)))?;
        }

        debug!("Stored {} row(s) in {table}", result.rows.len());
        Ok(())
    }

    /// Closes the connection, waiting for the worker to shut down.
    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| EvalError::internal(format!("Failed to close SQLite connection: {e}")))
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts a single column value using the storage class of the value itself,
/// since SQLite columns are dynamically typed.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if !raw.is_null() => raw.type_info().name().to_uppercase(),
        _ => return Value::Null,
    };

    match type_name.as_str() {
        "INTEGER" | "INT8" | "BIGINT" | "BOOLEAN" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "REAL" | "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // For all other storage classes, try to get as string
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Renames `""` to `column{n}` and repeats of a name to `name:{k}`.
fn unique_column_names(columns: &[ColumnInfo]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let base = if column.name.is_empty() {
                format!("column{}", i + 1)
            } else {
                column.name.clone()
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while !seen.insert(name.to_lowercase()) {
                name = format!("{base}:{suffix}");
                suffix += 1;
            }
            name
        })
        .collect()
}

/// Formats a query error, keeping only the database message when available.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}

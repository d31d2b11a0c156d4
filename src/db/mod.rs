//! Database layer for exec-match.
//!
//! Provides the result set model shared by the comparator and the harness,
//! plus the SQLite client the harness drives.

mod sqlite;
mod types;

pub use sqlite::SqliteClient;
pub use types::{ColumnInfo, ResultSet, Row, Value};

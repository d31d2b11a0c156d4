//! Shared fixtures for integration tests.

use exec_match::db::SqliteClient;
use std::path::{Path, PathBuf};

/// Creates a SQLite file at `dir/name` and runs `script` against it.
pub async fn create_database(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::File::create(&path).expect("create database file");

    let mut client = SqliteClient::open(&path).await.expect("open fixture");
    client.execute_script(script).await.expect("seed fixture");
    client.close().await.expect("close fixture");
    path
}

/// Returns the number of entries left in `dir`.
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).expect("read dir").count()
}

//! Sandboxed execution tests.
//!
//! Exercises isolation, cleanup and timeouts against real SQLite files.

use super::common::{create_database, entry_count};
use exec_match::db::Value;
use exec_match::harness::{ExecutionRequest, QueryRunner};
use exec_match::{EvalError, ExecutionOutcome, Harness};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const SEED: &str = "CREATE TABLE t(id INTEGER, name TEXT);
    INSERT INTO t VALUES (1, 'one'), (2, 'two'), (3, 'three');";

#[tokio::test]
async fn test_concurrent_executions_see_private_copies() {
    let data = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let db = create_database(data.path(), "shared.sqlite", SEED).await;

    let before_bytes = std::fs::read(&db).unwrap();
    let before_mtime = std::fs::metadata(&db).unwrap().modified().unwrap();

    let harness = Harness::new(Duration::from_secs(30)).with_scratch_dir(scratch.path());
    let deleting = harness.execute(ExecutionRequest {
        database: &db,
        query: "DELETE FROM t",
        setup_sql: None,
        validate_sql: Some("SELECT count(*) FROM t"),
    });
    let inserting = harness.execute(ExecutionRequest {
        database: &db,
        query: "SELECT count(*) FROM t",
        setup_sql: Some("INSERT INTO t VALUES (4, 'four'), (5, 'five');"),
        validate_sql: None,
    });
    let (deleted, inserted) = tokio::join!(deleting, inserting);

    assert_eq!(deleted.result().unwrap().rows, vec![vec![Value::Int(0)]]);
    assert_eq!(inserted.result().unwrap().rows, vec![vec![Value::Int(5)]]);

    // Source untouched, sandboxes gone.
    assert_eq!(std::fs::read(&db).unwrap(), before_bytes);
    assert_eq!(
        std::fs::metadata(&db).unwrap().modified().unwrap(),
        before_mtime
    );
    assert_eq!(entry_count(scratch.path()), 0);

    let untouched = harness
        .execute(ExecutionRequest {
            database: &db,
            query: "SELECT count(*) FROM t",
            setup_sql: None,
            validate_sql: None,
        })
        .await;
    assert_eq!(untouched.result().unwrap().rows, vec![vec![Value::Int(3)]]);
}

#[tokio::test]
async fn test_timeout_yields_failure_and_cleans_up() {
    let data = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let db = create_database(data.path(), "slow.sqlite", SEED).await;

    let harness = Harness::new(Duration::from_secs(1)).with_scratch_dir(scratch.path());
    let start = Instant::now();
    let outcome = harness
        .execute(ExecutionRequest {
            database: &db,
            query: "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                    SELECT max(x) FROM c",
            setup_sql: None,
            validate_sql: None,
        })
        .await;

    assert!(start.elapsed() < Duration::from_secs(10));
    match outcome {
        ExecutionOutcome::Failure(e) => assert!(e.is_timeout(), "unexpected failure: {e}"),
        ExecutionOutcome::Success(_) => panic!("expected a timeout"),
    }
    assert_eq!(entry_count(scratch.path()), 0);
}

#[tokio::test]
async fn test_timeout_does_not_affect_sibling_execution() {
    let data = tempdir().unwrap();
    let db = create_database(data.path(), "mixed.sqlite", SEED).await;

    let harness = Harness::new(Duration::from_secs(1));
    let slow = harness.execute(ExecutionRequest {
        database: &db,
        query: "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                SELECT max(x) FROM c",
        setup_sql: None,
        validate_sql: None,
    });
    let fast = harness.execute(ExecutionRequest {
        database: &db,
        query: "SELECT name FROM t WHERE id = 2",
        setup_sql: None,
        validate_sql: None,
    });
    let (slow, fast) = tokio::join!(slow, fast);

    assert!(!slow.is_success());
    assert_eq!(fast.result().unwrap().rows, vec![vec![Value::from("two")]]);
}

#[tokio::test]
async fn test_failures_leave_no_residue() {
    let data = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let db = create_database(data.path(), "broken.sqlite", SEED).await;

    let harness = Harness::default().with_scratch_dir(scratch.path());
    let outcome = harness
        .execute(ExecutionRequest {
            database: &db,
            query: "SELECT id FROM t",
            setup_sql: Some("INSERT INTO nowhere VALUES (1);"),
            validate_sql: None,
        })
        .await;

    assert!(matches!(outcome, ExecutionOutcome::Failure(EvalError::Query(_))));
    assert_eq!(entry_count(scratch.path()), 0);
}

#[tokio::test]
async fn test_validation_post_processes_result_table() {
    let data = tempdir().unwrap();
    let db = create_database(data.path(), "round.sqlite", SEED).await;

    let outcome = Harness::default()
        .execute(ExecutionRequest {
            database: &db,
            query: "SELECT id * 1.0 / 3 AS third FROM t ORDER BY id",
            setup_sql: None,
            validate_sql: Some("SELECT round(third, 2) FROM exec_match_result"),
        })
        .await;

    assert_eq!(
        outcome.result().unwrap().rows,
        vec![
            vec![Value::Float(0.33)],
            vec![Value::Float(0.67)],
            vec![Value::Float(1.0)],
        ]
    );
}

#[tokio::test]
async fn test_statement_scripts_are_executed_whole() {
    let data = tempdir().unwrap();
    let db = create_database(data.path(), "script.sqlite", SEED).await;

    let outcome = Harness::default()
        .execute(ExecutionRequest {
            database: &db,
            query: "CREATE TABLE x(a INTEGER); INSERT INTO x SELECT id FROM t WHERE id > 1",
            setup_sql: None,
            validate_sql: Some("SELECT sum(a) FROM x"),
        })
        .await;
    assert_eq!(outcome.result().unwrap().rows, vec![vec![Value::Int(5)]]);

    let outcome = Harness::default()
        .execute(ExecutionRequest {
            database: &db,
            query: "UPDATE t SET name = upper(name) WHERE id = 1 RETURNING name",
            setup_sql: None,
            validate_sql: None,
        })
        .await;
    assert_eq!(outcome.result().unwrap().rows, vec![vec![Value::from("ONE")]]);
}

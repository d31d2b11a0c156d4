//! End-to-end judging against SQLite database directories.

use super::common::{create_database, entry_count};
use exec_match::config::EvalConfig;
use exec_match::{EvalError, Harness, Judge, JudgeRequest, Verdict};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

const UNORDERED_IDS: &str = "CREATE TABLE t(id INTEGER);
    INSERT INTO t VALUES (3), (1), (2);";

const SINGERS: &str = "CREATE TABLE singer(singer_id INTEGER, name TEXT, country TEXT, age INTEGER);
    INSERT INTO singer VALUES
        (1, 'Joe Sharp', 'Netherlands', 52),
        (2, 'Timbaland', 'United States', 32),
        (3, 'Justin Brown', 'France', 29),
        (4, 'Rose White', 'France', 41);";

async fn single_database(script: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let db = create_database(dir.path(), "main.sqlite", script).await;
    (dir, db)
}

async fn judge(request: &JudgeRequest) -> exec_match::Result<Verdict> {
    Judge::new(Harness::new(Duration::from_secs(10)))
        .judge(request)
        .await
}

#[tokio::test]
async fn test_missing_order_by_fails_when_gold_orders() {
    let (_dir, db) = single_database(UNORDERED_IDS).await;

    let request = JudgeRequest::new(&db, "SELECT id FROM t", "SELECT id FROM t ORDER BY id");
    assert_eq!(judge(&request).await.unwrap(), Verdict::Fail);

    let request = JudgeRequest::new(&db, "SELECT id FROM t", "SELECT id FROM t ORDER BY id DESC");
    assert_eq!(judge(&request).await.unwrap(), Verdict::Fail);

    let request = JudgeRequest::new(
        &db,
        "SELECT id FROM t ORDER BY id",
        "SELECT id FROM t ORDER BY id",
    );
    assert_eq!(judge(&request).await.unwrap(), Verdict::Pass);
}

#[tokio::test]
async fn test_row_order_ignored_without_order_by() {
    let (_dir, db) = single_database(UNORDERED_IDS).await;

    let request = JudgeRequest::new(&db, "SELECT id FROM t ORDER BY id DESC", "SELECT id FROM t");
    assert_eq!(judge(&request).await.unwrap(), Verdict::Pass);
}

#[tokio::test]
async fn test_swapped_columns_pass() {
    let (_dir, db) = single_database(SINGERS).await;

    let request = JudgeRequest::new(
        &db,
        "SELECT age, name FROM singer",
        "SELECT name, age FROM singer",
    );
    assert_eq!(judge(&request).await.unwrap(), Verdict::Pass);
}

#[tokio::test]
async fn test_distinct_is_stripped_unless_kept() {
    let (_dir, db) = single_database(SINGERS).await;

    let mut request = JudgeRequest::new(
        &db,
        "SELECT DISTINCT country FROM singer",
        "SELECT country FROM singer",
    );
    assert_eq!(judge(&request).await.unwrap(), Verdict::Pass);

    request.keep_distinct = true;
    assert_eq!(judge(&request).await.unwrap(), Verdict::Fail);
}

#[tokio::test]
async fn test_one_divergent_replica_fails() {
    let dir = tempdir().unwrap();
    let primary = create_database(dir.path(), "a.sqlite", UNORDERED_IDS).await;
    create_database(
        dir.path(),
        "b.sqlite",
        "CREATE TABLE t(id INTEGER); INSERT INTO t VALUES (3), (10);",
    )
    .await;

    // Agrees on a.sqlite only.
    let request = JudgeRequest::new(&primary, "SELECT id FROM t WHERE id = 3", "SELECT id FROM t WHERE id > 2");
    assert_eq!(judge(&request).await.unwrap(), Verdict::Fail);

    let request = JudgeRequest::new(&primary, "SELECT id FROM t WHERE id >= 3", "SELECT id FROM t WHERE id > 2");
    assert_eq!(judge(&request).await.unwrap(), Verdict::Pass);
}

#[tokio::test]
async fn test_parallel_replicas_agree_with_sequential() {
    let dir = tempdir().unwrap();
    let primary = create_database(dir.path(), "a.db", UNORDERED_IDS).await;
    create_database(
        dir.path(),
        "b.db",
        "CREATE TABLE t(id INTEGER); INSERT INTO t VALUES (3), (10);",
    )
    .await;

    let config = EvalConfig {
        parallel_databases: true,
        timeout_secs: 10,
        ..EvalConfig::default()
    };
    let judge = Judge::from_config(&config);

    let request = JudgeRequest::new(&primary, "SELECT id FROM t WHERE id = 3", "SELECT id FROM t WHERE id > 2");
    assert_eq!(judge.judge(&request).await.unwrap(), Verdict::Fail);

    let request = JudgeRequest::new(&primary, "SELECT id FROM t WHERE id >= 3", "SELECT id FROM t WHERE id > 2");
    assert_eq!(judge.judge(&request).await.unwrap(), Verdict::Pass);
}

#[tokio::test]
async fn test_failing_gold_is_an_error() {
    let (_dir, db) = single_database(SINGERS).await;

    let request = JudgeRequest::new(&db, "SELECT name FROM singer", "SELECT name FROM no_such_table");
    let err = judge(&request).await.unwrap_err();
    assert!(matches!(err, EvalError::GoldFailed { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn test_failing_prediction_scores_zero() {
    let (_dir, db) = single_database(SINGERS).await;

    let request = JudgeRequest::new(&db, "SELECT nme FROM singer", "SELECT name FROM singer");
    assert_eq!(judge(&request).await.unwrap(), Verdict::Fail);

    let request = JudgeRequest::new(&db, "SELECT name FROM singer WHERE", "SELECT name FROM singer");
    assert_eq!(judge(&request).await.unwrap(), Verdict::Fail);
}

#[tokio::test]
async fn test_runaway_prediction_times_out_as_fail() {
    let (_dir, db) = single_database(SINGERS).await;
    let scratch = tempdir().unwrap();

    let config = EvalConfig {
        timeout_secs: 1,
        scratch_dir: Some(scratch.path().to_path_buf()),
        ..EvalConfig::default()
    };
    let request = JudgeRequest::new(
        &db,
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT max(x) FROM c",
        "SELECT count(*) FROM singer",
    );

    let verdict = Judge::from_config(&config).judge(&request).await.unwrap();
    assert_eq!(verdict, Verdict::Fail);
    assert_eq!(entry_count(scratch.path()), 0);
}

#[tokio::test]
async fn test_statements_judged_through_validation_sql() {
    let (_dir, db) = single_database(SINGERS).await;

    let mut request = JudgeRequest::new(
        &db,
        "UPDATE singer SET age = 1 + age WHERE country = 'France'",
        "UPDATE singer SET age = age + 1 WHERE country = 'France'",
    );
    request.validate_sql = Some("SELECT name, age FROM singer".to_string());
    assert_eq!(judge(&request).await.unwrap(), Verdict::Pass);

    request.predicted = "UPDATE singer SET age = age + 1".to_string();
    assert_eq!(judge(&request).await.unwrap(), Verdict::Fail);
}

#[tokio::test]
async fn test_setup_sql_runs_before_both_queries() {
    let (_dir, db) = single_database(SINGERS).await;

    let mut request = JudgeRequest::new(
        &db,
        "SELECT name FROM singer WHERE age > 60",
        "SELECT name FROM singer WHERE age >= 61",
    );
    request.setup_sql = Some("UPDATE singer SET age = 70 WHERE singer_id = 1;".to_string());
    assert_eq!(judge(&request).await.unwrap(), Verdict::Pass);
}

#[tokio::test]
async fn test_plugged_gold_values_rescue_wrong_literal() {
    let (_dir, db) = single_database(SINGERS).await;

    let mut request = JudgeRequest::new(
        &db,
        "SELECT name FROM singer WHERE country = 'france'",
        "SELECT name FROM singer WHERE country = 'France'",
    );
    assert_eq!(judge(&request).await.unwrap(), Verdict::Fail);

    request.plug_values = true;
    assert_eq!(judge(&request).await.unwrap(), Verdict::Pass);
}

#[tokio::test]
async fn test_batch_datapoints_deserialize_with_short_keys() {
    let (_dir, db) = single_database(SINGERS).await;

    let line = serde_json::json!({
        "db": db,
        "pred": "SELECT count(*) FROM singer",
        "gold": "SELECT count(singer_id) FROM singer",
    })
    .to_string();
    let request: JudgeRequest = serde_json::from_str(&line).unwrap();
    assert_eq!(judge(&request).await.unwrap(), Verdict::Pass);
}

#[tokio::test]
async fn test_sqlite_only_syntax_is_judged() {
    let (_dir, db) = single_database(SINGERS).await;

    let cases = [
        (
            "SELECT name FROM singer WHERE name LIKE 'j%'",
            "SELECT DISTINCT name FROM singer WHERE name GLOB 'J*'",
        ),
        (
            "SELECT name FROM singer ORDER BY age LIMIT 2 OFFSET 1",
            "SELECT name FROM singer ORDER BY age LIMIT 1, 2",
        ),
        (
            "SELECT name FROM singer WHERE age = 32",
            "SELECT name FROM singer WHERE age IS 32",
        ),
    ];
    for (predicted, gold) in cases {
        let request = JudgeRequest::new(&db, predicted, gold);
        assert_eq!(judge(&request).await.unwrap(), Verdict::Pass, "{gold}");

        let swapped = JudgeRequest::new(&db, gold, predicted);
        assert_eq!(judge(&swapped).await.unwrap(), Verdict::Pass, "{predicted}");
    }
}

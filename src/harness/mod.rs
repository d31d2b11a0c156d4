//! Sandboxed query execution.
//!
//! Runs one query against one database file inside a private working copy,
//! bounded by a wall-clock timeout. Failures are returned as data in
//! [`ExecutionOutcome`] rather than as errors.

mod sandbox;

pub use sandbox::Sandbox;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::db::{ResultSet, SqliteClient};
use crate::error::{EvalError, Result};

/// Name of the table the target query's output is materialised into.
pub const RESULT_TABLE: &str = "exec_match_result";

/// Default wall-clock budget for one execution attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of executing one query against one database file.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The query (and validation step, if any) produced these rows.
    Success(ResultSet),
    /// Setup, execution or validation failed, or the attempt timed out.
    Failure(EvalError),
}

impl ExecutionOutcome {
    /// Returns true for a successful execution.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the result set of a successful execution.
    pub fn result(&self) -> Option<&ResultSet> {
        match self {
            Self::Success(result) => Some(result),
            Self::Failure(_) => None,
        }
    }
}

impl From<Result<ResultSet>> for ExecutionOutcome {
    fn from(result: Result<ResultSet>) -> Self {
        match result {
            Ok(rows) => Self::Success(rows),
            Err(e) => Self::Failure(e),
        }
    }
}

/// One query to run, with its optional setup and validation SQL.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub database: &'a Path,
    pub query: &'a str,
    pub setup_sql: Option<&'a str>,
    pub validate_sql: Option<&'a str>,
}

/// Executes queries against database files.
///
/// The judge is written against this seam so it can be driven without real
/// databases.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Executes a single request. Never retries.
    async fn execute(&self, request: ExecutionRequest<'_>) -> ExecutionOutcome;
}

/// Production [`QueryRunner`] backed by sandboxed SQLite copies.
#[derive(Debug, Clone)]
pub struct Harness {
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Harness {
    /// Creates a harness with the given per-attempt timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            scratch_dir: None,
        }
    }

    /// Places sandbox directories under `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Runs the whole attempt (copy, connect, setup, query, validation)
    /// under the timeout.
    async fn execute_bounded(&self, request: ExecutionRequest<'_>) -> ExecutionOutcome {
        let start = Instant::now();
        let cancel = CancellationToken::new();

        match tokio::time::timeout(self.timeout, self.run(request, cancel.clone())).await {
            Ok(result) => {
                let outcome = ExecutionOutcome::from(
                    result.map(|rows| rows.with_execution_time(start.elapsed())),
                );
                if let ExecutionOutcome::Failure(e) = &outcome {
                    debug!("Execution failed on {}: {e}", request.database.display());
                }
                outcome
            }
            Err(_) => {
                cancel.cancel();
                warn!(
                    "Query timed out after {:?} on {}",
                    self.timeout,
                    request.database.display()
                );
                ExecutionOutcome::Failure(EvalError::Timeout(self.timeout))
            }
        }
    }

    async fn run(&self, request: ExecutionRequest<'_>, cancel: CancellationToken) -> Result<ResultSet> {
        let sandbox = Sandbox::create(request.database, self.scratch_dir.as_deref()).await?;
        let mut client = SqliteClient::open(sandbox.database_path()).await?;
        client.interrupt_on(cancel.clone()).await?;

        // Dropped before the client and sandbox if this future is abandoned,
        // so an in-flight statement is interrupted before teardown.
        let guard = cancel.drop_guard();

        let result = run_steps(&mut client, &request).await;

        let _ = guard.disarm();
        if let Err(e) = client.close().await {
            warn!("{e}");
        }
        sandbox.close();
        result
    }
}

#[async_trait]
impl QueryRunner for Harness {
    async fn execute(&self, request: ExecutionRequest<'_>) -> ExecutionOutcome {
        self.execute_bounded(request).await
    }
}

/// Setup, materialisation of the target query, then validation.
async fn run_steps(client: &mut SqliteClient, request: &ExecutionRequest<'_>) -> Result<ResultSet> {
    if let Some(setup) = request.setup_sql {
        debug!("Running setup SQL: {setup}");
        client.execute_script(setup).await?;
    }

    materialize(client, request.query).await?;

    let default_validation = format!("SELECT * FROM {RESULT_TABLE}");
    let validate = request.validate_sql.unwrap_or(&default_validation);
    debug!("Running validation SQL: {validate}");
    client.fetch_all(validate).await
}

/// Stores the query's output in [`RESULT_TABLE`].
///
/// Queries are stored with `CREATE TABLE .. AS`. Other statements that return
/// rows (`INSERT .. RETURNING`, `PRAGMA`) run once and their rows are copied
/// in. Everything else, including multi-statement scripts, is executed for its
/// side effects and leaves an empty single-column placeholder table behind.
async fn materialize(client: &mut SqliteClient, query: &str) -> Result<()> {
    let query = query.trim().trim_end_matches(';').trim_end();
    if query.is_empty() {
        return Err(EvalError::query("Empty query"));
    }

    let shape = statement_shape(query);
    let tabular = match shape {
        StatementShape::Query => client.is_tabular(query).await?,
        StatementShape::Statement => client.is_tabular(query).await.unwrap_or(false),
        StatementShape::Script => false,
    };

    match (shape, tabular) {
        (StatementShape::Query, true) => {
            client
                .execute_script(&format!("CREATE TABLE {RESULT_TABLE} AS {query}"))
                .await
        }
        (_, true) => {
            let rows = client.fetch_all(query).await?;
            client.create_table_from(RESULT_TABLE, &rows).await
        }
        (_, false) => {
            client.execute_script(query).await?;
            client
                .execute_script(&format!("CREATE TABLE {RESULT_TABLE}(empty TEXT)"))
                .await
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementShape {
    /// A single SELECT, VALUES or WITH statement.
    Query,
    /// A single statement of any other kind.
    Statement,
    /// More than one statement.
    Script,
}

fn statement_shape(sql: &str) -> StatementShape {
    let Ok(tokens) = Tokenizer::new(&SQLiteDialect {}, sql).tokenize() else {
        // Let execution report the error.
        return StatementShape::Statement;
    };

    let mut significant = tokens.iter().filter(|t| !matches!(t, Token::Whitespace(_)));
    let leading = significant.next();

    let mut after_separator = false;
    for token in significant {
        match token {
            Token::SemiColon => after_separator = true,
            _ if after_separator => return StatementShape::Script,
            _ => {}
        }
    }

    match leading {
        Some(Token::Word(word))
            if matches!(word.keyword, Keyword::SELECT | Keyword::VALUES | Keyword::WITH) =>
        {
            StatementShape::Query
        }
        Some(Token::LParen) => StatementShape::Query,
        _ => StatementShape::Statement,
    }
}

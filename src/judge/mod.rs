//! Execution-match judging.
//!
//! Combines the harness and the comparator: a predicted query passes if it,
//! or one of its value-substituted variants, produces the gold denotation on
//! every database file in the gold database's directory.

mod databases;

pub use databases::database_directory;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::compare::DenotationComparator;
use crate::config::EvalConfig;
use crate::error::{EvalError, Result};
use crate::harness::{ExecutionOutcome, ExecutionRequest, Harness, QueryRunner};
use crate::rewrite::{has_order_by, SqlRewriter, StandardRewriter};

/// Final decision for one datapoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Some candidate matched the gold denotation on every database.
    Pass,
    /// No candidate did.
    Fail,
}

impl Verdict {
    /// Returns the verdict as a 0/1 score.
    pub fn score(self) -> u8 {
        match self {
            Self::Pass => 1,
            Self::Fail => 0,
        }
    }

    /// Returns true for a passing verdict.
    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.score())
    }
}

/// One datapoint to judge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgeRequest {
    /// Primary database file; its directory supplies the replicas.
    #[serde(alias = "db")]
    pub database: PathBuf,

    /// Predicted SQL.
    #[serde(alias = "pred")]
    pub predicted: String,

    /// Gold SQL.
    pub gold: String,

    /// SQL run against each private copy before the query.
    #[serde(default)]
    pub setup_sql: Option<String>,

    /// SQL whose rows are the denotation, typically reading the result table.
    #[serde(default)]
    pub validate_sql: Option<String>,

    /// Also try variants of the prediction with gold literals plugged in.
    #[serde(default)]
    pub plug_values: bool,

    /// Keep DISTINCT modifiers instead of stripping them.
    #[serde(default)]
    pub keep_distinct: bool,

    /// Log each database as it is checked.
    #[serde(default)]
    pub show_progress: bool,
}

impl JudgeRequest {
    /// Creates a request with all options off.
    pub fn new(
        database: impl Into<PathBuf>,
        predicted: impl Into<String>,
        gold: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            predicted: predicted.into(),
            gold: gold.into(),
            ..Default::default()
        }
    }
}

/// Judges predicted queries against gold queries.
pub struct Judge<R = Harness> {
    runner: R,
    comparator: DenotationComparator,
    rewriter: Box<dyn SqlRewriter>,
    database_extensions: Vec<String>,
    parallel_databases: bool,
}

impl Judge<Harness> {
    /// Creates a judge with a sandboxed SQLite harness configured from `config`.
    pub fn from_config(config: &EvalConfig) -> Self {
        let mut harness = Harness::new(config.timeout());
        if let Some(dir) = &config.scratch_dir {
            harness = harness.with_scratch_dir(dir);
        }

        Self::new(harness)
            .with_comparator(DenotationComparator::new(config.comparator.clone()))
            .with_rewriter(StandardRewriter::new(config.substitution.max_variants))
            .with_database_extensions(config.database_extensions.clone())
            .with_parallel_databases(config.parallel_databases)
    }
}

impl<R: QueryRunner> Judge<R> {
    /// Creates a judge over `runner` with default settings.
    pub fn new(runner: R) -> Self {
        let defaults = EvalConfig::default();
        Self {
            runner,
            comparator: DenotationComparator::default(),
            rewriter: Box::new(StandardRewriter::default()),
            database_extensions: defaults.database_extensions,
            parallel_databases: defaults.parallel_databases,
        }
    }

    /// Sets the comparator.
    pub fn with_comparator(mut self, comparator: DenotationComparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Sets the SQL text collaborators.
    pub fn with_rewriter(mut self, rewriter: impl SqlRewriter + 'static) -> Self {
        self.rewriter = Box::new(rewriter);
        self
    }

    /// Sets the extensions recognised as database replicas.
    pub fn with_database_extensions(mut self, extensions: Vec<String>) -> Self {
        self.database_extensions = extensions;
        self
    }

    /// Checks a candidate's database files concurrently when enabled.
    pub fn with_parallel_databases(mut self, parallel: bool) -> Self {
        self.parallel_databases = parallel;
        self
    }

    /// Judges one datapoint.
    ///
    /// Returns an error only when the gold query cannot be rewritten or fails
    /// to execute on some database; every candidate-side problem is a `Fail`.
    pub async fn judge(&self, request: &JudgeRequest) -> Result<Verdict> {
        let predicted = self.rewriter.normalize(&request.predicted);
        let gold = self.rewriter.normalize(&request.gold);

        let (predicted, gold) = if request.keep_distinct {
            (predicted, gold)
        } else {
            let predicted = match self.rewriter.strip_distinct(&predicted) {
                Ok(sql) => sql,
                Err(e) => {
                    debug!("Predicted query rejected before execution: {e}");
                    return Ok(Verdict::Fail);
                }
            };
            let gold = self.rewriter.strip_distinct(&gold).map_err(|e| {
                error!("Gold query could not be rewritten: {gold}");
                e
            })?;
            (predicted, gold)
        };

        let order_matters = has_order_by(&gold);
        let databases = database_directory(&request.database, &self.database_extensions)
            .map_err(|e| {
                error!("Gold query has no databases to run on: {e}");
                EvalError::gold_failed(&request.database, &gold, e)
            })?;

        let mut candidates = vec![predicted.clone()];
        if request.plug_values {
            candidates.extend(self.rewriter.substitute_values(&gold, &predicted));
        }
        debug!(
            "Judging {} candidate(s) on {} database(s), order matters: {order_matters}",
            candidates.len(),
            databases.len()
        );

        for (index, candidate) in candidates.iter().enumerate() {
            if self
                .accepts(request, &gold, candidate, &databases, order_matters)
                .await?
            {
                debug!("Candidate {index} accepted: {candidate}");
                return Ok(Verdict::Pass);
            }
        }

        Ok(Verdict::Fail)
    }

    /// Returns true if `candidate` matches gold on every database.
    async fn accepts(
        &self,
        request: &JudgeRequest,
        gold: &str,
        candidate: &str,
        databases: &[PathBuf],
        order_matters: bool,
    ) -> Result<bool> {
        let total = databases.len();

        if self.parallel_databases {
            let checks = databases.iter().enumerate().map(|(index, database)| {
                self.check_database(request, gold, candidate, database, order_matters, (index, total))
            });
            let matches = futures::future::try_join_all(checks).await?;
            return Ok(matches.into_iter().all(|matched| matched));
        }

        for (index, database) in databases.iter().enumerate() {
            let matched = self
                .check_database(request, gold, candidate, database, order_matters, (index, total))
                .await?;
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Runs gold then candidate on one database and compares the results.
    async fn check_database(
        &self,
        request: &JudgeRequest,
        gold: &str,
        candidate: &str,
        database: &Path,
        order_matters: bool,
        (index, total): (usize, usize),
    ) -> Result<bool> {
        if request.show_progress {
            info!("[{}/{}] {}", index + 1, total, database.display());
        }

        let gold_result = match self
            .runner
            .execute(execution(request, database, gold))
            .await
        {
            ExecutionOutcome::Success(result) => result,
            ExecutionOutcome::Failure(e) => {
                error!("Gold query failed on {}: {e}", database.display());
                return Err(EvalError::gold_failed(database, gold, e));
            }
        };

        let candidate_result = match self
            .runner
            .execute(execution(request, database, candidate))
            .await
        {
            ExecutionOutcome::Success(result) => result,
            ExecutionOutcome::Failure(e) => {
                debug!("Candidate failed on {}: {e}", database.display());
                return Ok(false);
            }
        };

        let equivalent =
            self.comparator
                .equivalent(&gold_result.rows, &candidate_result.rows, order_matters);
        if !equivalent {
            debug!("Denotation mismatch on {}", database.display());
        }
        Ok(equivalent)
    }
}

fn execution<'a>(request: &'a JudgeRequest, database: &'a Path, query: &'a str) -> ExecutionRequest<'a> {
    ExecutionRequest {
        database,
        query,
        setup_sql: request.setup_sql.as_deref(),
        validate_sql: request.validate_sql.as_deref(),
    }
}

//! Command-line argument parsing for exec-match.
//!
//! Uses clap to parse CLI arguments. Flags given on the command line override
//! the config file.

use clap::Parser;
use exec_match::config::EvalConfig;
use exec_match::error::Result;
use exec_match::JudgeRequest;
use std::path::PathBuf;

/// Checks whether a predicted SQL query produces the gold query's result on
/// every database replica.
#[derive(Parser, Debug)]
#[command(name = "exec-match")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Primary database file; sibling files with the same extension are also used
    #[arg(long, value_name = "PATH", required_unless_present = "batch")]
    pub db: Option<PathBuf>,

    /// Predicted SQL query
    #[arg(long, value_name = "SQL", required_unless_present = "batch")]
    pub pred: Option<String>,

    /// Gold SQL query
    #[arg(long, value_name = "SQL", required_unless_present = "batch")]
    pub gold: Option<String>,

    /// SQL run against each database copy before the query
    #[arg(long, value_name = "SQL")]
    pub setup_sql: Option<String>,

    /// SQL whose rows are compared (reads the `exec_match_result` table)
    #[arg(long, value_name = "SQL")]
    pub validate_sql: Option<String>,

    /// JSON Lines file of datapoints to judge, one verdict printed per line
    #[arg(long, value_name = "PATH", conflicts_with_all = ["db", "pred", "gold"])]
    pub batch: Option<PathBuf>,

    /// Also accept predictions once gold literal values are plugged in
    #[arg(long)]
    pub plug_value: bool,

    /// Keep DISTINCT modifiers instead of stripping them
    #[arg(long)]
    pub keep_distinct: bool,

    /// Log every database file as it is checked
    #[arg(long)]
    pub progress: bool,

    /// Timeout per query execution in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Check database files concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(EvalConfig::default_path)
    }

    /// Loads the config file and applies command-line overrides.
    pub fn load_config(&self) -> Result<EvalConfig> {
        let mut config = EvalConfig::load_from_file(&self.config_path())?;
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if self.parallel {
            config.parallel_databases = true;
        }
        config.validate()?;
        Ok(config)
    }

    /// Builds the datapoint given directly on the command line, if any.
    pub fn single_request(&self) -> Option<JudgeRequest> {
        let (db, pred, gold) = (self.db.as_ref()?, self.pred.as_ref()?, self.gold.as_ref()?);
        let mut request = JudgeRequest::new(db, pred, gold);
        request.setup_sql = self.setup_sql.clone();
        request.validate_sql = self.validate_sql.clone();
        self.apply_flags(&mut request);
        Some(request)
    }

    /// Turns on the per-datapoint options set on the command line.
    pub fn apply_flags(&self, request: &mut JudgeRequest) {
        request.plug_values |= self.plug_value;
        request.keep_distinct |= self.keep_distinct;
        request.show_progress |= self.progress;
    }
}

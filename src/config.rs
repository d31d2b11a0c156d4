//! Configuration management for exec-match.
//!
//! Handles loading evaluation settings from a TOML file. Every field has a
//! default, so a missing file or an empty table is a valid configuration.

use crate::compare::ComparatorConfig;
use crate::error::{EvalError, Result};
use crate::rewrite::DEFAULT_MAX_VARIANTS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for exec-match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Wall-clock budget for one (query, database) execution, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// File extensions recognised as database replicas in a directory.
    #[serde(default = "default_database_extensions")]
    pub database_extensions: Vec<String>,

    /// Check a candidate's database files concurrently.
    #[serde(default)]
    pub parallel_databases: bool,

    /// Directory under which sandboxes are created (system temp dir if unset).
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Column permutation search tuning.
    #[serde(default)]
    pub comparator: ComparatorConfig,

    /// Value substitution settings.
    #[serde(default)]
    pub substitution: SubstitutionConfig,
}

/// Value substitution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionConfig {
    /// Upper bound on variants enumerated per datapoint.
    #[serde(default = "default_max_variants")]
    pub max_variants: usize,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_database_extensions() -> Vec<String> {
    vec!["sqlite".to_string(), "sqlite3".to_string(), "db".to_string()]
}

fn default_max_variants() -> usize {
    DEFAULT_MAX_VARIANTS
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self {
            max_variants: default_max_variants(),
        }
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            database_extensions: default_database_extensions(),
            parallel_databases: false,
            scratch_dir: None,
            comparator: ComparatorConfig::default(),
            substitution: SubstitutionConfig::default(),
        }
    }
}

impl EvalConfig {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("exec-match")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| EvalError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses and validates configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            EvalError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that cannot produce a meaningful evaluation.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(EvalError::config("timeout_secs must be positive"));
        }
        if self.database_extensions.is_empty() {
            return Err(EvalError::config(
                "database_extensions must name at least one extension",
            ));
        }
        Ok(())
    }

    /// Returns the per-execution timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

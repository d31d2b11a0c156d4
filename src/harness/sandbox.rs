//! Private working copies of database files.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{EvalError, Result};

/// Prefix for sandbox directory names.
const SANDBOX_PREFIX: &str = "exec-match-";

/// An exclusively-owned temporary directory holding a copy of one database.
///
/// The directory (and the copy inside it) is removed when the sandbox is
/// dropped, whichever way the owning scope is left.
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
    database: PathBuf,
}

impl Sandbox {
    /// Copies `source` into a fresh uniquely-named directory under `root`
    /// (the system temp dir when `None`).
    pub async fn create(source: &Path, root: Option<&Path>) -> Result<Self> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(EvalError::sandbox(format!(
                "Database not found: {}",
                source.display()
            )));
        }

        let file_name = source.file_name().ok_or_else(|| {
            EvalError::sandbox(format!("Not a database file: {}", source.display()))
        })?;

        let mut builder = tempfile::Builder::new();
        builder.prefix(SANDBOX_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| EvalError::sandbox(format!("Failed to create sandbox directory: {e}")))?;

        let database = dir.path().join(file_name);
        tokio::fs::copy(source, &database).await.map_err(|e| {
            EvalError::sandbox(format!("Failed to copy {}: {e}", source.display()))
        })?;

        debug!("Sandbox {} holds {}", dir.path().display(), source.display());
        Ok(Self { dir, database })
    }

    /// Path of the private database copy.
    pub fn database_path(&self) -> &Path {
        &self.database
    }

    /// Path of the sandbox directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the sandbox, logging rather than failing if removal goes wrong.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove sandbox {}: {e}", path.display());
        }
    }
}

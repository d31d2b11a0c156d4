//! Discovery of database replicas sharing a directory.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{EvalError, Result};

/// Lists the database files a datapoint is judged against.
///
/// These are all files in the primary database's directory that share its
/// extension, provided the extension is one of `extensions`. A primary with an
/// unrecognised extension is judged alone. The result is sorted so repeated
/// runs visit databases in the same order.
pub fn database_directory(primary: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let recognised = primary
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)));

    let Some(extension) = recognised else {
        warn!(
            "{} has no recognised database extension, judging it alone",
            primary.display()
        );
        return Ok(vec![primary.to_path_buf()]);
    };

    let dir = match primary.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let entries = std::fs::read_dir(dir).map_err(|e| {
        EvalError::sandbox(format!(
            "Failed to read database directory {}: {e}",
            dir.display()
        ))
    })?;

    let mut databases: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();
    databases.sort();

    if databases.is_empty() {
        // Nothing on disk: let execution report the missing primary.
        databases.push(primary.to_path_buf());
    }

    debug!("Judging against {} database file(s) in {}", databases.len(), dir.display());
    Ok(databases)
}

//! Database integrity verification.
//!
//! Wraps `PRAGMA integrity_check` behind a small trait so the backup manager
//! can be driven by scripted verdicts in tests.

use crate::error::Result;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Diagnostic `SQLite` reports for a healthy database.
pub const INTEGRITY_OK: &str = "ok";

/// Outcome of an integrity check against one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityVerdict {
    pub path: PathBuf,
    /// First diagnostic row; `"ok"` when healthy.
    pub integrity: String,
}

impl IntegrityVerdict {
    pub fn new(path: impl Into<PathBuf>, integrity: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            integrity: integrity.into(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.integrity == INTEGRITY_OK
    }
}

/// Something that can judge whether a database file is consistent.
pub trait IntegrityCheck {
    /// Check the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the check could not be run at all (for example
    /// the file is not a database).
    fn check(&self, path: &Path) -> Result<IntegrityVerdict>;

    /// Like [`IntegrityCheck::check`], but a check that raises becomes a
    /// failed verdict carrying the error text.
    fn verdict(&self, path: &Path) -> IntegrityVerdict {
        self.check(path)
            .unwrap_or_else(|e| IntegrityVerdict::new(path, e.to_string()))
    }
}

/// Runs `PRAGMA integrity_check` on a read-only connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteIntegrityChecker;

impl IntegrityCheck for SqliteIntegrityChecker {
    fn check(&self, path: &Path) -> Result<IntegrityVerdict> {
        // Dropped on every return path, including when the pragma fails.
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let first: Option<String> = conn
            .prepare("PRAGMA integrity_check")?
            .query_map([], |row| row.get::<_, String>(0))?
            .next()
            .transpose()?;

        let integrity = first.unwrap_or_else(|| "unknown".to_string());
        debug!(path = %path.display(), %integrity, "Integrity check finished");
        Ok(IntegrityVerdict::new(path, integrity))
    }
}

/// Check a database file with the default checker.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the pragma fails.
pub fn check(path: &Path) -> Result<IntegrityVerdict> {
    SqliteIntegrityChecker.check(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_database_is_ok() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.db");
        Storage::open(&path).unwrap().close().unwrap();

        let verdict = check(&path).unwrap();
        assert!(verdict.is_ok());
        assert_eq!(verdict.integrity, "ok");
    }

    #[test]
    fn test_garbage_file_fails_verdict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, "not a sqlite database\n".repeat(256)).unwrap();

        let verdict = SqliteIntegrityChecker.verdict(&path);
        assert!(!verdict.is_ok());
        assert!(!verdict.integrity.is_empty());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(check(&dir.path().join("missing.db")).is_err());
    }

    #[test]
    fn test_check_does_not_modify_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.db");
        Storage::open(&path).unwrap().close().unwrap();
        let before = std::fs::read(&path).unwrap();

        check(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}

//! Verified backup and transactional restore of the local database.
//!
//! Backups use `SQLite`'s online backup API, so they are consistent even
//! while another connection writes to the source. Restores snapshot the
//! destination first and put it back if the restored file fails
//! verification.

use crate::error::{Result, SonarError};
use crate::integrity::{IntegrityCheck, SqliteIntegrityChecker};
use crate::storage::{SIDECAR_SUFFIXES, remove_database, sidecar_path};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, DatabaseName, OpenFlags};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Outcome of a successful backup.
#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
    pub source: PathBuf,
    pub backup: PathBuf,
    pub bytes: u64,
}

/// Outcome of a successful restore.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreResult {
    pub from: PathBuf,
    pub to: PathBuf,
    /// Safety snapshot taken before the copy. Already deleted on success.
    pub pre_restore: Option<PathBuf>,
}

/// Default backup location: `<dir>/<stem>-backup-<YYYYMMDDHHMMSS>.db`.
#[must_use]
pub fn default_backup_path(source: &Path, now: DateTime<Utc>) -> PathBuf {
    let stem = source
        .file_stem()
        .map_or_else(|| "data".into(), |s| s.to_string_lossy());
    let name = format!("{stem}-backup-{}.db", now.format("%Y%m%d%H%M%S"));
    source.with_file_name(name)
}

/// Safety snapshot location: `<dest>.pre-restore.<epoch-ms>`.
#[must_use]
pub fn pre_restore_path(dest: &Path, epoch_millis: i64) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(format!(".pre-restore.{epoch_millis}"));
    PathBuf::from(name)
}

/// Copy a database file plus its sidecars, so that the destination's
/// sidecar set exactly mirrors the source's.
///
/// # Errors
///
/// Returns an error if any copy or removal fails.
pub fn copy_with_sidecars(src: &Path, dst: &Path) -> Result<()> {
    std::fs::copy(src, dst).map_err(|e| SonarError::path_error("copy", src, e))?;

    for suffix in SIDECAR_SUFFIXES {
        let src_sidecar = sidecar_path(src, suffix);
        let dst_sidecar = sidecar_path(dst, suffix);
        if src_sidecar.exists() {
            std::fs::copy(&src_sidecar, &dst_sidecar)
                .map_err(|e| SonarError::path_error("copy", &src_sidecar, e))?;
        } else {
            remove_if_present(&dst_sidecar)?;
        }
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SonarError::path_error("remove", path, e)),
    }
}

/// Absolute form of `path` with symlinks resolved where the file (or its
/// parent directory) exists.
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map_or_else(|_| absolute.clone(), |p| p.join(name)),
        _ => absolute,
    }
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| SonarError::path_error("create directory", parent, e))?;
    }
    Ok(())
}

/// Folds the WAL into the main file before a backup. Not every file
/// supports it, so failures are only logged.
fn checkpoint_best_effort(source: &Path) {
    let result = Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_WRITE)
        .and_then(|conn| conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(())));
    match result {
        Ok(()) => debug!("Checkpointed {}", source.display()),
        Err(e) => debug!("Skipping checkpoint of {}: {e}", source.display()),
    }
}

/// Switch a fresh page copy out of WAL mode so it stays a single file when
/// it is later opened read-only.
fn use_rollback_journal(path: &Path) -> Result<()> {
    let conn = Connection::open(path)?;
    conn.pragma_update_and_check(None, "journal_mode", "DELETE", |row| {
        row.get::<_, String>(0)
    })?;
    conn.close().map_err(|(_, e)| SonarError::from(e))
}

/// Backup and restore driver, generic over the integrity checker.
#[derive(Debug, Clone, Default)]
pub struct BackupManager<C = SqliteIntegrityChecker> {
    checker: C,
}

impl BackupManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: IntegrityCheck> BackupManager<C> {
    pub const fn with_checker(checker: C) -> Self {
        Self { checker }
    }

    /// Produce a verified backup of `source`.
    ///
    /// When `dest` is `None` the backup lands next to the source under
    /// [`default_backup_path`].
    ///
    /// # Errors
    ///
    /// - [`SonarError::SourceNotFound`] if `source` is missing
    /// - [`SonarError::SameFile`] if `dest` is the source itself
    /// - [`SonarError::BackupIntegrity`] if the written backup is not clean
    pub fn backup(&self, source: &Path, dest: Option<&Path>) -> Result<BackupResult> {
        if !source.is_file() {
            return Err(SonarError::source_not_found(source));
        }

        let dest = dest
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| default_backup_path(source, Utc::now()), Path::to_path_buf);

        if resolve_path(source) == resolve_path(&dest) {
            return Err(SonarError::SameFile { path: dest });
        }

        create_parent_dir(&dest)?;
        checkpoint_best_effort(source);

        // A leftover WAL next to the target would be replayed into the copy.
        for suffix in SIDECAR_SUFFIXES {
            remove_if_present(&sidecar_path(&dest, suffix))?;
        }

        let conn = Connection::open_with_flags(
            source,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.backup(DatabaseName::Main, &dest, None)?;
        drop(conn);
        use_rollback_journal(&dest)?;

        let verdict = self.checker.verdict(&dest);
        if !verdict.is_ok() {
            return Err(SonarError::BackupIntegrity {
                path: dest,
                reason: verdict.integrity,
            });
        }

        let bytes = std::fs::metadata(&dest)
            .map_err(|e| SonarError::path_error("stat", &dest, e))?
            .len();
        info!(source = %source.display(), backup = %dest.display(), bytes, "Backup complete");

        Ok(BackupResult {
            source: source.to_path_buf(),
            backup: dest,
            bytes,
        })
    }

    /// Replace `dest` with the database at `source`.
    ///
    /// The destination ends up either byte-identical to its previous state
    /// or holding a verified copy of `source`. The only exception is a
    /// destination that did not exist beforehand: a copy that fails
    /// verification is then left in place.
    ///
    /// # Errors
    ///
    /// - [`SonarError::SameFile`] if both paths resolve to the same file
    /// - [`SonarError::SourceNotFound`] if `source` is missing
    /// - [`SonarError::SourceIntegrity`] if `source` is not clean
    /// - [`SonarError::RestoreRolledBack`] if the copy failed verification
    ///   and the previous destination was put back
    /// - [`SonarError::RestoreIntegrity`] if the copy failed verification
    ///   and there was nothing to roll back to
    pub fn restore(&self, source: &Path, dest: &Path) -> Result<RestoreResult> {
        let resolved_dest = resolve_path(dest);
        if resolve_path(source) == resolved_dest {
            return Err(SonarError::SameFile {
                path: resolved_dest,
            });
        }
        if !source.is_file() {
            return Err(SonarError::source_not_found(source));
        }

        let source_verdict = self.checker.verdict(source);
        if !source_verdict.is_ok() {
            return Err(SonarError::SourceIntegrity {
                path: source.to_path_buf(),
                reason: source_verdict.integrity,
            });
        }

        create_parent_dir(dest)?;

        let snapshot = if dest.exists() {
            let snapshot = pre_restore_path(dest, Utc::now().timestamp_millis());
            copy_with_sidecars(dest, &snapshot)?;
            debug!("Saved pre-restore snapshot at {}", snapshot.display());
            Some(snapshot)
        } else {
            None
        };

        if let Err(e) = copy_with_sidecars(source, dest) {
            if let Some(snapshot) = &snapshot {
                Self::roll_back(snapshot, dest)?;
            }
            return Err(e);
        }

        let verdict = self.checker.verdict(dest);
        if verdict.is_ok() {
            if let Some(snapshot) = &snapshot {
                remove_database(snapshot)?;
            }
            info!(from = %source.display(), to = %dest.display(), "Restore complete");
            return Ok(RestoreResult {
                from: source.to_path_buf(),
                to: dest.to_path_buf(),
                pre_restore: snapshot,
            });
        }

        match snapshot {
            Some(snapshot) => {
                Self::roll_back(&snapshot, dest)?;
                Err(SonarError::RestoreRolledBack {
                    path: dest.to_path_buf(),
                    reason: verdict.integrity,
                })
            }
            None => Err(SonarError::RestoreIntegrity {
                path: dest.to_path_buf(),
                reason: verdict.integrity,
            }),
        }
    }

    /// Put the snapshot back over `dest`, then drop the snapshot. If the copy
    /// back fails the snapshot is kept so nothing is lost.
    fn roll_back(snapshot: &Path, dest: &Path) -> Result<()> {
        info!(dest = %dest.display(), "Rolling back restore");
        if let Err(e) = copy_with_sidecars(snapshot, dest) {
            error!(
                snapshot = %snapshot.display(),
                "Rollback failed; previous database kept at snapshot path"
            );
            return Err(e);
        }
        remove_database(snapshot)
    }
}

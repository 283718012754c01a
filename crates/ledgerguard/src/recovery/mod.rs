//! Backups, atomic writes and corruption recovery for ledger documents.
//!
//! Every write goes through a temporary sibling that is synced and then
//! renamed over the target, so readers see either the old or the new bytes.
//! Recovery walks a fixed ladder of strategies and stops at the first that
//! yields a document:
//!
//! 1. `restore_from_backup`: newest backup that parses, restored verbatim.
//! 2. `partial_repair`: structural repair of the corrupted bytes.
//! 3. `reconstruct_minimal`: the schema's minimal document.

mod backup;
mod errors;
mod repair;

#[cfg(test)]
mod tests;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use strum::Display;
use tracing::{debug, info};

use ledgerguard_config::LogComponent;

use crate::context::LedgerContext;
use crate::schema::Schema;

pub use backup::BackupRecord;
pub use errors::RecoveryError;

pub(crate) const RECOVERY_TARGET: &str = LogComponent::Recovery.target();

/// Attempts at finding a free backup name before giving up.
const BACKUP_NAME_ATTEMPTS: u32 = 1_000;

/// Recovery strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Restore the newest parseable backup.
    RestoreFromBackup,
    /// Salvage what parses from the corrupted bytes.
    PartialRepair,
    /// Synthesise the schema's minimal document.
    ReconstructMinimal,
}

/// A document produced by one recovery strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    /// Strategy that succeeded.
    pub strategy: RecoveryStrategy,
    /// Recovered document.
    pub data: Value,
    /// Backup the document came from, for `restore_from_backup`.
    pub restored_from: Option<PathBuf>,
    contents: Vec<u8>,
}

impl Recovery {
    /// Bytes written to the document when the recovery is applied.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

/// Backup, atomic write and recovery operations.
#[derive(Debug, Clone)]
pub struct BackupService {
    context: LedgerContext,
}

impl BackupService {
    /// Builds a service stamping backups with the context clock.
    #[must_use]
    pub fn new(context: LedgerContext) -> Self {
        Self { context }
    }

    /// Copies `path` to `<path>.backup.<timestamp>`.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::BackupFailed`] when the document is missing
    /// or unreadable, or the copy cannot be written.
    pub fn create_backup(&self, path: impl AsRef<Path>) -> Result<BackupRecord, RecoveryError> {
        let original = path.as_ref();
        let failed = |source| RecoveryError::BackupFailed {
            path: original.to_path_buf(),
            source,
        };
        let contents = fs::read(original).map_err(failed)?;

        let mut timestamp = self.context.now();
        for _ in 0..BACKUP_NAME_ATTEMPTS {
            let backup_path = backup::backup_path(original, timestamp)?;
            if publish(&backup_path, &contents, false).map_err(failed)? {
                let record = BackupRecord {
                    original_path: original.to_path_buf(),
                    backup_path,
                    timestamp,
                };
                self.context.reporter().backup_created(&record);
                return Ok(record);
            }
            timestamp += time::Duration::NANOSECOND;
        }
        Err(failed(io::Error::from(io::ErrorKind::AlreadyExists)))
    }

    /// Replaces `path` with `content`, or with its current bytes followed by
    /// `content` when `append` is set.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Read`] when appending to an unreadable file
    /// and [`RecoveryError::Write`] when the replacement cannot be written.
    pub fn atomic_write(
        &self,
        path: impl AsRef<Path>,
        content: &[u8],
        append: bool,
    ) -> Result<(), RecoveryError> {
        let target = path.as_ref();
        let mut bytes = Vec::new();
        if append {
            match fs::read(target) {
                Ok(existing) => bytes = existing,
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(RecoveryError::read(target, error)),
            }
        }
        bytes.extend_from_slice(content);
        publish(target, &bytes, true).map_err(|source| RecoveryError::write(target, source))?;
        debug!(
            target: RECOVERY_TARGET,
            file = %target.display(),
            bytes = bytes.len(),
            append,
            "document written"
        );
        Ok(())
    }

    /// Backups of `path`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Read`] when the document's directory cannot
    /// be listed.
    pub fn list_available_backups(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<BackupRecord>, RecoveryError> {
        let original = path.as_ref();
        backup::list(original)
            .map_err(|source| RecoveryError::read(backup::parent_dir(original), source))
    }

    /// Deletes all but the newest `keep` backups of `path` and returns the
    /// deleted ones.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Read`] when backups cannot be listed and
    /// [`RecoveryError::Write`] when one cannot be deleted.
    pub fn prune_backups(
        &self,
        path: impl AsRef<Path>,
        keep: usize,
    ) -> Result<Vec<BackupRecord>, RecoveryError> {
        let expired: Vec<_> = self
            .list_available_backups(path)?
            .into_iter()
            .skip(keep)
            .collect();
        for record in &expired {
            fs::remove_file(&record.backup_path)
                .map_err(|source| RecoveryError::write(&record.backup_path, source))?;
        }
        if !expired.is_empty() {
            info!(
                target: RECOVERY_TARGET,
                removed = expired.len(),
                kept = keep,
                "pruned backups"
            );
        }
        Ok(expired)
    }

    /// Works out how `path` would be recovered without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Unrecoverable`] when every strategy fails and
    /// [`RecoveryError::Read`] when backups cannot be listed.
    pub fn plan_recovery(
        &self,
        path: impl AsRef<Path>,
        schema: &Schema,
    ) -> Result<Recovery, RecoveryError> {
        let target = path.as_ref();
        let mut attempted = vec![RecoveryStrategy::RestoreFromBackup];
        if let Some(recovery) = self.restore_from_backup(target)? {
            return Ok(recovery);
        }

        attempted.push(RecoveryStrategy::PartialRepair);
        match fs::read(target) {
            Ok(raw) => {
                if let Some(data) = repair::repair(&String::from_utf8_lossy(&raw)) {
                    return encoded(target, RecoveryStrategy::PartialRepair, data);
                }
            }
            Err(error) => debug!(
                target: RECOVERY_TARGET,
                file = %target.display(),
                error = %error,
                "corrupted document unreadable; skipping partial repair"
            ),
        }

        attempted.push(RecoveryStrategy::ReconstructMinimal);
        if let Some(data) = schema.minimal_document(self.context.now()) {
            return encoded(target, RecoveryStrategy::ReconstructMinimal, data);
        }

        Err(RecoveryError::Unrecoverable {
            path: target.to_path_buf(),
            strategies_attempted: attempted,
        })
    }

    /// Recovers `path` and atomically writes the result over it.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Unrecoverable`] when every strategy fails,
    /// leaving the file untouched, and [`RecoveryError::Write`] when the
    /// recovered document cannot be written.
    pub fn recover_corrupted_file(
        &self,
        path: impl AsRef<Path>,
        schema: &Schema,
    ) -> Result<Recovery, RecoveryError> {
        let target = path.as_ref();
        let recovery = self.plan_recovery(target, schema)?;
        self.atomic_write(target, recovery.contents(), false)?;
        self.context
            .reporter()
            .file_recovered(target, recovery.strategy);
        Ok(recovery)
    }

    fn restore_from_backup(&self, target: &Path) -> Result<Option<Recovery>, RecoveryError> {
        for record in self.list_available_backups(target)? {
            let contents = match fs::read(&record.backup_path) {
                Ok(bytes) => bytes,
                Err(error) => {
                    debug!(
                        target: RECOVERY_TARGET,
                        backup = %record.backup_path.display(),
                        error = %error,
                        "skipping unreadable backup"
                    );
                    continue;
                }
            };
            if let Ok(data) = serde_json::from_slice::<Value>(&contents) {
                return Ok(Some(Recovery {
                    strategy: RecoveryStrategy::RestoreFromBackup,
                    data,
                    restored_from: Some(record.backup_path),
                    contents,
                }));
            }
            debug!(
                target: RECOVERY_TARGET,
                backup = %record.backup_path.display(),
                "skipping unparseable backup"
            );
        }
        Ok(None)
    }
}

fn encoded(path: &Path, strategy: RecoveryStrategy, data: Value) -> Result<Recovery, RecoveryError> {
    let contents = serde_json::to_vec_pretty(&data).map_err(|source| RecoveryError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Recovery {
        strategy,
        data,
        restored_from: None,
        contents,
    })
}

/// Writes `contents` to a synced temporary sibling of `path` and moves it
/// into place.
///
/// With `overwrite` unset an existing file is left alone and `Ok(false)` is
/// returned.
fn publish(path: &Path, contents: &[u8], overwrite: bool) -> io::Result<bool> {
    stage_and_persist(path, overwrite, |staged| staged.write_all(contents))
}

/// Runs `fill` against the temporary sibling, then syncs and renames it.
///
/// A `fill` that fails or unwinds drops the sibling unpersisted, leaving
/// `path` untouched.
fn stage_and_persist(
    path: &Path,
    overwrite: bool,
    fill: impl FnOnce(&mut tempfile::NamedTempFile) -> io::Result<()>,
) -> io::Result<bool> {
    let mut staged = tempfile::NamedTempFile::new_in(backup::parent_dir(path))?;
    fill(&mut staged)?;
    staged.as_file().sync_all()?;
    let persisted = if overwrite {
        staged.persist(path)
    } else {
        staged.persist_noclobber(path)
    };
    match persisted {
        Ok(_) => Ok(true),
        Err(error) if !overwrite && error.error.kind() == io::ErrorKind::AlreadyExists => {
            Ok(false)
        }
        Err(error) => Err(error.error),
    }
}

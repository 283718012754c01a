//! Transactional fix pipeline over a shared ledger document.
//!
//! ```text
//! pre-checks -> backup -> lock -> read (recover if corrupt) -> validate
//!   -> policy-filtered fixes -> confirm -> verify lock -> atomic write
//!   -> unlock -> report
//! ```
//!
//! A recovered document and the fixes applied to it reach disk in a single
//! write, and only while the agent still owns a live lock. The lock is
//! released on every path once it has been taken; a failed release fails
//! the run. Read-only
//! inspection (`dry_run`, `get_file_status`) never locks, backs up or writes.

mod errors;
mod session;
mod status;


use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use ledgerguard_config::{AutoFixLevel, Config, LogComponent};

use crate::context::LedgerContext;
use crate::lock::{LockError, LockManager};
use crate::recovery::{BackupService, RecoveryError};
use crate::schema::{ErrorKind, Fix, FixKind, Schema, SyntaxCheck, ValidationResult, Validator};

pub use errors::{BoxedSource, OrchestratorError};
pub use session::{FailedFix, FixSessionReport};
pub use status::{DryRunReport, FileStatus, SuggestedAction};

use session::FixSession;

pub(crate) const ORCHESTRATOR_TARGET: &str = LogComponent::Orchestrator.target();

/// Runs the backup, lock, validate, fix and write pipeline.
#[derive(Debug)]
pub struct Orchestrator {
    context: LedgerContext,
    locks: Arc<LockManager>,
    backups: BackupService,
    validator: Validator,
    agent_id: String,
    level: AutoFixLevel,
    selective: Vec<FixKind>,
    create_backups: bool,
    validate_after_fix: bool,
    max_fix_attempts: u32,
}

impl Orchestrator {
    /// Builds an orchestrator sharing `locks` with other agents in this
    /// process.
    #[must_use]
    pub fn new(
        context: LedgerContext,
        config: &Config,
        schema: Schema,
        locks: Arc<LockManager>,
    ) -> Self {
        let agent_id = config.agent_id().map_or_else(
            || format!("ledgerguard-orchestrator-{}", std::process::id()),
            ToOwned::to_owned,
        );
        let validator = Validator::new(schema).with_clock(context.clock());
        Self {
            backups: BackupService::new(context.clone()),
            context,
            locks,
            validator,
            agent_id,
            level: config.auto_fix_level(),
            selective: Vec::new(),
            create_backups: config.create_backups(),
            validate_after_fix: config.validate_after_fix(),
            max_fix_attempts: config.max_fix_attempts(),
        }
    }

    /// Builds an orchestrator with its own lock manager.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] when the lock directory cannot be created.
    pub fn from_config(
        context: LedgerContext,
        config: &Config,
        schema: Schema,
    ) -> Result<Self, LockError> {
        let locks = Arc::new(LockManager::new(context.clone(), config)?);
        Ok(Self::new(context, config, schema, locks))
    }

    /// Sets the fix kinds permitted under [`AutoFixLevel::Selective`].
    #[must_use]
    pub fn with_selective_fixes(mut self, kinds: impl IntoIterator<Item = FixKind>) -> Self {
        self.selective = kinds.into_iter().collect();
        self
    }

    /// Agent id used when locking documents.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Lock manager shared by this orchestrator.
    #[must_use]
    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Backup service used by this orchestrator.
    #[must_use]
    pub fn backup_service(&self) -> &BackupService {
        &self.backups
    }

    /// Validates `path` and applies every fix the configured level permits.
    ///
    /// # Errors
    ///
    /// See [`OrchestratorError`]; [`OrchestratorError::reason`] gives the
    /// stable failure code.
    pub fn auto_fix(&self, path: impl AsRef<Path>) -> Result<FixSessionReport, OrchestratorError> {
        self.run(path.as_ref(), None)
    }

    /// Like [`Orchestrator::auto_fix`], restricted to fixes for `error_kinds`.
    ///
    /// # Errors
    ///
    /// See [`OrchestratorError`].
    pub fn fix_specific_errors(
        &self,
        path: impl AsRef<Path>,
        error_kinds: &[ErrorKind],
    ) -> Result<FixSessionReport, OrchestratorError> {
        self.run(path.as_ref(), Some(error_kinds))
    }

    /// Reports what [`Orchestrator::auto_fix`] would do without backing up,
    /// locking or writing.
    ///
    /// # Errors
    ///
    /// Returns a pre-check error when the document is missing or unreadable,
    /// and [`OrchestratorError::Unrecoverable`] when it is corrupt beyond
    /// recovery.
    pub fn dry_run(&self, path: impl AsRef<Path>) -> Result<DryRunReport, OrchestratorError> {
        let target = path.as_ref();
        let raw = read_document(target)?;
        let (data, recovery_needed) = match self.validator.validate_json_syntax(&raw) {
            SyntaxCheck::Valid(data) => (data, None),
            SyntaxCheck::Invalid { .. } => {
                let recovery = self
                    .backups
                    .plan_recovery(target, self.validator.schema())
                    .map_err(|source| recovery_failure(target, source))?;
                (recovery.data, Some(recovery.strategy))
            }
        };
        let result = self.validator.validate_and_sanitize(&data);
        let proposed_fixes = self.select(&result.fixes, None);
        Ok(DryRunReport {
            would_fix: !proposed_fixes.is_empty(),
            errors: result.errors,
            proposed_fixes,
            recovery_needed,
        })
    }

    /// Summarises the health of `path` without locking or writing.
    #[must_use]
    pub fn get_file_status(&self, path: impl AsRef<Path>) -> FileStatus {
        let target = path.as_ref();
        let mut status = FileStatus::missing(target.to_path_buf());
        let Ok(metadata) = fs::metadata(target) else {
            return status;
        };
        status.exists = true;
        status.writable = !metadata.permissions().readonly();
        status.backup_count = self
            .backups
            .list_available_backups(target)
            .map_or(0, |backups| backups.len());

        if let Ok(raw) = fs::read(target) {
            status.readable = true;
            match self.validator.validate_json_syntax(&String::from_utf8_lossy(&raw)) {
                SyntaxCheck::Valid(data) => {
                    let result = self.validator.validate_and_sanitize(&data);
                    status.is_valid = result.is_valid;
                    status.auto_fixable_errors = result.auto_fixable_count();
                    status.manual_fix_required = result.manual_count();
                }
                SyntaxCheck::Invalid { message, .. } => status.syntax_error = Some(message),
            }
        }
        status.suggest();
        status
    }

    fn run(
        &self,
        path: &Path,
        only: Option<&[ErrorKind]>,
    ) -> Result<FixSessionReport, OrchestratorError> {
        let mut session = FixSession::start(self.context.now());
        precheck(path)?;
        session.log("Pre-checks passed");

        if self.create_backups {
            let record = self
                .backups
                .create_backup(path)
                .map_err(|source| OrchestratorError::BackupFailed {
                    path: path.to_path_buf(),
                    source,
                })?;
            session.backed_up(record);
        }

        self.locks
            .acquire_lock(path, &self.agent_id, self.locks.default_timeout())
            .map_err(|source| OrchestratorError::LockFailed {
                path: path.to_path_buf(),
                source,
            })?;
        session.log("Lock acquired");

        let outcome = self.fix_locked(path, only, &mut session);

        let released = self.locks.release_lock(path, &self.agent_id);
        match &released {
            Ok(_) => session.log("Lock released"),
            Err(error) => {
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    file = %path.display(),
                    error = %error,
                    "failed to release document lock"
                );
                session.log(format!("Lock release failed: {error}"));
            }
        }

        let finished = outcome.and_then(|()| {
            released
                .map(drop)
                .map_err(|source| OrchestratorError::LockFailed {
                    path: path.to_path_buf(),
                    source,
                })
        });
        if let Err(error) = finished {
            warn!(
                target: ORCHESTRATOR_TARGET,
                file = %path.display(),
                reason = error.reason(),
                error = %error,
                "fix pipeline failed"
            );
            return Err(error);
        }

        let report = session.finish();
        self.context.reporter().session_finished(&report);
        Ok(report)
    }

    fn fix_locked(
        &self,
        path: &Path,
        only: Option<&[ErrorKind]>,
        session: &mut FixSession,
    ) -> Result<(), OrchestratorError> {
        let raw = fs::read(path).map_err(|source| OrchestratorError::unexpected(path, source))?;
        let (mut document, recovered) = match self
            .validator
            .validate_json_syntax(&String::from_utf8_lossy(&raw))
        {
            SyntaxCheck::Valid(data) => (data, None),
            SyntaxCheck::Invalid {
                message,
                line,
                column,
            } => {
                session.log(format!("Syntax error at {line}:{column}: {message}"));
                let recovery = self
                    .backups
                    .plan_recovery(path, self.validator.schema())
                    .map_err(|source| recovery_failure(path, source))?;
                let strategy = recovery.strategy;
                let contents = recovery.contents().to_vec();
                (recovery.data, Some((strategy, contents)))
            }
        };

        let initial = self.validator.validate_and_sanitize(&document);
        session.total_errors = initial.errors.len();
        let withheld = initial.fixes.len() - self.select(&initial.fixes, only).len();
        if withheld > 0 {
            session.log(format!("{withheld} proposed fixes withheld by policy"));
        }

        let (changed, last) = self.apply_fixes(&mut document, initial, only, session);
        session.is_valid = last.is_valid;
        session.errors_fixed = if self.validate_after_fix {
            session.total_errors.saturating_sub(last.errors.len())
        } else {
            session.fixes_applied.len().min(session.total_errors)
        };

        // Recovered bytes are kept verbatim unless fixes changed the document.
        let recovered_with = recovered.as_ref().map(|(strategy, _)| *strategy);
        let pending = if changed {
            let mut encoded = serde_json::to_vec_pretty(&document)
                .map_err(|source| OrchestratorError::unexpected(path, source))?;
            encoded.push(b'\n');
            Some(encoded)
        } else {
            recovered.map(|(_, bytes)| bytes)
        };
        let Some(contents) = pending else {
            return Ok(());
        };

        self.locks
            .verify_lock(path, &self.agent_id)
            .map_err(|source| OrchestratorError::LockFailed {
                path: path.to_path_buf(),
                source,
            })?;
        self.backups
            .atomic_write(path, &contents, false)
            .map_err(|source| OrchestratorError::unexpected(path, source))?;
        if let Some(strategy) = recovered_with {
            info!(
                target: ORCHESTRATOR_TARGET,
                file = %path.display(),
                strategy = %strategy,
                "File recovered using strategy: {}",
                strategy
            );
            self.context.reporter().file_recovered(path, strategy);
            session.recovered(strategy);
        }
        session.has_changes = true;
        session.log("Document written");
        Ok(())
    }

    /// Applies permitted fixes in bounded passes, re-validating after each.
    ///
    /// Returns whether the document changed and the last validation result.
    fn apply_fixes(
        &self,
        document: &mut Value,
        initial: ValidationResult,
        only: Option<&[ErrorKind]>,
        session: &mut FixSession,
    ) -> (bool, ValidationResult) {
        let mut changed = false;
        let mut current = initial;
        let mut pending = self.select(&current.fixes, only);
        let mut attempts = 0;

        while !pending.is_empty() && attempts < self.max_fix_attempts {
            attempts += 1;
            for fix in &pending {
                if fix.apply(document) {
                    session.applied(fix);
                    changed = true;
                } else {
                    session.failed(fix, "target no longer exists");
                }
            }
            if !self.validate_after_fix {
                return (changed, current);
            }
            current = self.validator.validate_and_sanitize(document);
            session.log(format!(
                "Confirmation pass {attempts}: {} errors remain",
                current.errors.len()
            ));
            pending = self.select(&current.fixes, only);
        }

        for fix in &pending {
            session.failed(fix, format!("unresolved after {attempts} attempts"));
        }
        (changed, current)
    }

    fn select(&self, fixes: &[Fix], only: Option<&[ErrorKind]>) -> Vec<Fix> {
        fixes
            .iter()
            .filter(|fix| self.permits(fix))
            .filter(|fix| only.is_none_or(|kinds| kinds.contains(&fix.kind.resolves())))
            .cloned()
            .collect()
    }

    fn permits(&self, fix: &Fix) -> bool {
        match self.level {
            AutoFixLevel::Conservative => fix.kind == FixKind::MissingIdAdded,
            AutoFixLevel::Moderate => fix.automated,
            AutoFixLevel::Aggressive => true,
            AutoFixLevel::Selective => self.selective.contains(&fix.kind),
        }
    }
}

fn precheck(path: &Path) -> Result<(), OrchestratorError> {
    let metadata = match fs::metadata(path) {
        Ok(found) => found,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Err(OrchestratorError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(OrchestratorError::Unreadable {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    File::open(path).map_err(|source| OrchestratorError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.permissions().readonly() {
        return Err(OrchestratorError::ReadOnly {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn read_document(path: &Path) -> Result<String, OrchestratorError> {
    match fs::read(path) {
        Ok(raw) => Ok(String::from_utf8_lossy(&raw).into_owned()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Err(OrchestratorError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(OrchestratorError::Unreadable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn recovery_failure(path: &Path, source: RecoveryError) -> OrchestratorError {
    match source {
        RecoveryError::Unrecoverable { .. } => OrchestratorError::Unrecoverable {
            path: path.to_path_buf(),
            source,
        },
        other => OrchestratorError::unexpected(path, other),
    }
}

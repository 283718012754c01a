//! Per-call bookkeeping for a fix pipeline run.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use super::ORCHESTRATOR_TARGET;
use crate::recovery::{BackupRecord, RecoveryStrategy};
use crate::schema::{Fix, FixKind};

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A selected fix that did not take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFix {
    /// Fix category.
    pub kind: FixKind,
    /// JSON pointer the fix targeted.
    pub path: String,
    /// Why it failed.
    pub reason: String,
}

/// Frozen summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixSessionReport {
    /// Unique id of the run.
    pub session_id: String,
    /// Instant the run started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Wall time spent.
    pub duration: Duration,
    /// Errors found in the document as read (or as recovered).
    pub total_errors: usize,
    /// Errors no longer present after fixing.
    pub errors_fixed: usize,
    /// Fixes applied, in order.
    pub fixes_applied: Vec<FixKind>,
    /// Selected fixes that did not take.
    pub failed_fixes: Vec<FailedFix>,
    /// Whether a backup was taken before mutation.
    pub backup_created: bool,
    /// Location of that backup.
    pub backup_path: Option<PathBuf>,
    /// Whether the document on disk was modified.
    pub has_changes: bool,
    /// Whether the final document passed validation.
    pub is_valid: bool,
    /// Strategy used when the document had to be recovered.
    pub recovered_with: Option<RecoveryStrategy>,
    /// Ordered log of pipeline steps.
    pub operations: Vec<String>,
}

/// Mutable state of a run. Append-only until [`FixSession::finish`].
#[derive(Debug)]
pub(super) struct FixSession {
    session_id: String,
    started_at: OffsetDateTime,
    started: Instant,
    pub(super) total_errors: usize,
    pub(super) errors_fixed: usize,
    pub(super) fixes_applied: Vec<FixKind>,
    failed_fixes: Vec<FailedFix>,
    backup: Option<BackupRecord>,
    pub(super) has_changes: bool,
    pub(super) is_valid: bool,
    recovered_with: Option<RecoveryStrategy>,
    operations: Vec<String>,
}

impl FixSession {
    pub(super) fn start(now: OffsetDateTime) -> Self {
        let sequence = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            session_id: format!("fix-{:x}-{sequence}", now.unix_timestamp_nanos()),
            started_at: now,
            started: Instant::now(),
            total_errors: 0,
            errors_fixed: 0,
            fixes_applied: Vec::new(),
            failed_fixes: Vec::new(),
            backup: None,
            has_changes: false,
            is_valid: false,
            recovered_with: None,
            operations: Vec::new(),
        }
    }

    pub(super) fn log(&mut self, entry: impl Into<String>) {
        let operation = entry.into();
        debug!(
            target: ORCHESTRATOR_TARGET,
            session = %self.session_id,
            operation = %operation,
            "pipeline step"
        );
        self.operations.push(operation);
    }

    pub(super) fn backed_up(&mut self, record: BackupRecord) {
        self.log(format!("Backup created: {}", record.backup_path.display()));
        self.backup = Some(record);
    }

    pub(super) fn recovered(&mut self, strategy: RecoveryStrategy) {
        self.log(format!("File recovered using strategy: {strategy}"));
        self.recovered_with = Some(strategy);
        self.has_changes = true;
    }

    pub(super) fn applied(&mut self, fix: &Fix) {
        self.log(format!("Applied {} at {}", fix.kind, fix.path));
        self.fixes_applied.push(fix.kind);
    }

    pub(super) fn failed(&mut self, fix: &Fix, cause: impl Into<String>) {
        let reason = cause.into();
        self.log(format!("Fix {} at {} failed: {reason}", fix.kind, fix.path));
        self.failed_fixes.push(FailedFix {
            kind: fix.kind,
            path: fix.path.clone(),
            reason,
        });
    }

    pub(super) fn finish(self) -> FixSessionReport {
        FixSessionReport {
            session_id: self.session_id,
            started_at: self.started_at,
            duration: self.started.elapsed(),
            total_errors: self.total_errors,
            errors_fixed: self.errors_fixed,
            fixes_applied: self.fixes_applied,
            failed_fixes: self.failed_fixes,
            backup_created: self.backup.is_some(),
            backup_path: self.backup.map(|record| record.backup_path),
            has_changes: self.has_changes,
            is_valid: self.is_valid,
            recovered_with: self.recovered_with,
            operations: self.operations,
        }
    }
}

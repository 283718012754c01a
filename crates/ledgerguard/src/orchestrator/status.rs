//! Read-only inspection reports.

use std::path::PathBuf;

use serde::Serialize;
use strum::Display;

use crate::recovery::RecoveryStrategy;
use crate::schema::{Fix, ValidationIssue};

/// Next step recommended for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuggestedAction {
    /// The document does not exist yet.
    CreateFile,
    /// The document cannot be read or parsed.
    AttemptRecovery,
    /// Auto-fix can repair at least one error.
    RunAutoFix,
    /// The document is valid.
    NoActionNeeded,
    /// Every error needs a human.
    ManualIntervention,
}

/// Snapshot of a document's health. Produced without locking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    /// Document path.
    pub path: PathBuf,
    /// Whether the path exists.
    pub exists: bool,
    /// Whether the file could be read.
    pub readable: bool,
    /// Whether the file is writable.
    pub writable: bool,
    /// Whether the file parsed and passed validation.
    pub is_valid: bool,
    /// Parser message when the file is not JSON.
    pub syntax_error: Option<String>,
    /// Errors with a proposed fix.
    pub auto_fixable_errors: usize,
    /// Errors that need a human.
    pub manual_fix_required: usize,
    /// Backups on disk.
    pub backup_count: usize,
    /// Recommended next step.
    pub suggested_action: SuggestedAction,
}

impl FileStatus {
    pub(super) fn missing(path: PathBuf) -> Self {
        Self {
            path,
            exists: false,
            readable: false,
            writable: false,
            is_valid: false,
            syntax_error: None,
            auto_fixable_errors: 0,
            manual_fix_required: 0,
            backup_count: 0,
            suggested_action: SuggestedAction::CreateFile,
        }
    }

    pub(super) fn suggest(&mut self) {
        self.suggested_action = if !self.exists {
            SuggestedAction::CreateFile
        } else if !self.readable || self.syntax_error.is_some() {
            SuggestedAction::AttemptRecovery
        } else if self.is_valid {
            SuggestedAction::NoActionNeeded
        } else if self.auto_fixable_errors > 0 {
            SuggestedAction::RunAutoFix
        } else {
            SuggestedAction::ManualIntervention
        };
    }
}

/// What an auto-fix run would do, computed without side effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DryRunReport {
    /// Errors in the document (or in its recovered form).
    pub errors: Vec<ValidationIssue>,
    /// Fixes the configured policy would apply.
    pub proposed_fixes: Vec<Fix>,
    /// Whether any fix would be applied.
    pub would_fix: bool,
    /// Recovery the document would need before fixing, if corrupt.
    pub recovery_needed: Option<RecoveryStrategy>,
}

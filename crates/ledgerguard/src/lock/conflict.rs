//! Conflict reporting and resolution policy hooks.
//!
//! Resolution strategies are policy signals for the caller. None of them
//! touches document content; `merge`, `queue` and `force` only acknowledge
//! that the caller may proceed under its own semantics.

use std::path::PathBuf;

use serde::Serialize;
use strum::{Display, EnumString};

use super::record::LockId;

/// What the requesting agent intends to do with the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AccessIntent {
    /// Inspect without mutating.
    Read,
    /// Mutate the resource.
    Write,
}

/// How disruptive a conflict is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConflictSeverity {
    /// A read against a held lock; the reader may observe stale data.
    Medium,
    /// A write against a held lock; proceeding would race the holder.
    High,
}

/// Another agent holds a live lock on the requested resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// Resource under contention.
    pub resource_path: PathBuf,
    /// Lock guarding the resource.
    pub lock_id: LockId,
    /// Agent currently holding the lock.
    pub holder: String,
    /// Agent asking for access.
    pub requester: String,
    /// What the requester intends to do.
    pub intent: AccessIntent,
    /// How disruptive proceeding would be.
    pub severity: ConflictSeverity,
}

impl Conflict {
    pub(super) fn new(
        resource_path: PathBuf,
        lock_id: LockId,
        holder: String,
        requester: &str,
        intent: AccessIntent,
    ) -> Self {
        let severity = match intent {
            AccessIntent::Write => ConflictSeverity::High,
            AccessIntent::Read => ConflictSeverity::Medium,
        };
        Self {
            resource_path,
            lock_id,
            holder,
            requester: requester.to_string(),
            intent,
            severity,
        }
    }
}

/// Result of checking a resource for conflicting holders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    /// The conflict, when one exists.
    pub conflict: Option<Conflict>,
    /// Advice for the requester.
    pub recommendation: String,
}

impl ConflictReport {
    pub(super) fn clear() -> Self {
        Self {
            conflict: None,
            recommendation: "resource is available; proceed".to_string(),
        }
    }

    pub(super) fn contended(conflict: Conflict) -> Self {
        let recommendation = match conflict.severity {
            ConflictSeverity::High => format!(
                "wait for '{}' to release the lock or queue the write",
                conflict.holder
            ),
            ConflictSeverity::Medium => format!(
                "read may observe in-flight changes from '{}'; retry after release for a consistent view",
                conflict.holder
            ),
        };
        Self {
            conflict: Some(conflict),
            recommendation,
        }
    }

    /// Whether another agent holds the resource.
    #[must_use]
    pub fn has_conflict(&self) -> bool {
        self.conflict.is_some()
    }
}

/// Policy the caller wants applied to a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ResolutionStrategy {
    /// Caller will merge its change with the holder's.
    Merge,
    /// Caller will wait its turn.
    Queue,
    /// Caller will proceed regardless.
    Force,
    /// Caller gives up.
    Abort,
}

/// Errors encountered while parsing a [`ResolutionStrategy`] from text.
pub type ResolutionStrategyParseError = strum::ParseError;

/// Outcome of applying a resolution strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Strategy that was applied.
    pub strategy: ResolutionStrategy,
    /// Whether the caller may proceed.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
}

pub(super) fn resolve(conflict: &Conflict, strategy: ResolutionStrategy) -> Resolution {
    let (success, message) = match strategy {
        ResolutionStrategy::Merge => (
            true,
            format!("merge accepted against holder '{}'", conflict.holder),
        ),
        ResolutionStrategy::Queue => (
            true,
            format!("request queued behind holder '{}'", conflict.holder),
        ),
        ResolutionStrategy::Force => (
            true,
            format!("forcing access over holder '{}'", conflict.holder),
        ),
        ResolutionStrategy::Abort => (
            false,
            format!("aborted; '{}' keeps the resource", conflict.holder),
        ),
    };
    Resolution {
        strategy,
        success,
        message,
    }
}

//! Error surface of the lock manager.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::record::LockFileError;

/// Errors surfaced by lock acquisition, release and inspection.
#[derive(Debug, Error)]
pub enum LockError {
    /// Acquisition exhausted its attempts or its time budget.
    #[error(
        "timed out acquiring lock on '{resource}' after {attempts} attempts ({waited:?}); held by '{holder}'"
    )]
    Timeout {
        /// Resource that could not be locked.
        resource: PathBuf,
        /// Attempts made before giving up.
        attempts: u32,
        /// Time spent waiting.
        waited: Duration,
        /// Agent holding the lock at the last attempt.
        holder: String,
    },
    /// The caller does not own the lock it tried to act on.
    #[error("agent '{requester}' does not own the lock on '{resource}' (held by '{holder}')")]
    Ownership {
        /// Resource the lock protects.
        resource: PathBuf,
        /// Agent that made the call.
        requester: String,
        /// Agent recorded as the holder.
        holder: String,
    },
    /// No lock exists for the resource.
    #[error("no lock is held on '{resource}'")]
    NotHeld {
        /// Resource that was expected to be locked.
        resource: PathBuf,
    },
    /// Waiting would close a cycle in the wait-for graph.
    #[error("deadlock detected while '{agent}' waited on '{resource}': {}", .cycle.join(" -> "))]
    Deadlock {
        /// Resource the agent was waiting on.
        resource: PathBuf,
        /// Agent that detected the deadlock.
        agent: String,
        /// Agents forming the cycle, in wait order.
        cycle: Vec<String>,
    },
    /// A lock file exists but cannot be interpreted.
    #[error("lock file '{path}' is corrupt: {source}")]
    CorruptLockFile {
        /// Lock file path.
        path: PathBuf,
        /// Decoding failure.
        #[source]
        source: LockFileError,
    },
    /// Filesystem access failed.
    #[error("lock file operation on '{path}' failed: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl LockError {
    pub(super) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller may reasonably retry the same call later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Deadlock { .. })
    }
}

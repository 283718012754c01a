//! Error surface of the fix pipeline.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::lock::LockError;
use crate::recovery::RecoveryError;

/// Boxed error carried by [`OrchestratorError::Unexpected`].
pub type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

/// Why a pipeline call failed.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The document does not exist.
    #[error("'{path}' does not exist")]
    NotFound {
        /// Document path.
        path: PathBuf,
    },
    /// The document cannot be opened for reading.
    #[error("'{path}' is not readable: {source}")]
    Unreadable {
        /// Document path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The document is read-only.
    #[error("'{path}' is not writable")]
    ReadOnly {
        /// Document path.
        path: PathBuf,
    },
    /// The pre-mutation backup failed; nothing was changed.
    #[error("Backup failed for '{path}': {source}")]
    BackupFailed {
        /// Document path.
        path: PathBuf,
        /// Backup failure.
        #[source]
        source: RecoveryError,
    },
    /// The document lock could not be taken; nothing was changed.
    #[error("could not lock '{path}': {source}")]
    LockFailed {
        /// Document path.
        path: PathBuf,
        /// Lock failure.
        #[source]
        source: LockError,
    },
    /// The document is corrupt and every recovery strategy failed.
    #[error("'{path}' is corrupt and could not be recovered: {source}")]
    Unrecoverable {
        /// Document path.
        path: PathBuf,
        /// Recovery failure listing the strategies tried.
        #[source]
        source: RecoveryError,
    },
    /// Any other failure inside the pipeline.
    #[error("unexpected failure while processing '{path}': {source}")]
    Unexpected {
        /// Document path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: BoxedSource,
    },
}

impl OrchestratorError {
    pub(super) fn unexpected(path: impl Into<PathBuf>, source: impl Into<BoxedSource>) -> Self {
        Self::Unexpected {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Stable machine-readable reason.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::Unreadable { .. } | Self::ReadOnly { .. } => {
                "precheck_failed"
            }
            Self::BackupFailed { .. } => "backup_failed",
            Self::LockFailed { .. } => "file_lock_failed",
            Self::Unrecoverable { .. } => "corruption_unrecoverable",
            Self::Unexpected { .. } => "unexpected_error",
        }
    }
}

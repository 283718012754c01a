//! Error surface of the backup and recovery service.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::RecoveryStrategy;

/// Errors raised while backing up, writing or recovering documents.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The document could not be copied; nothing was mutated.
    #[error("backup of '{path}' failed: {source}")]
    BackupFailed {
        /// Document being backed up.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Every recovery strategy failed; manual intervention is required.
    #[error(
        "'{path}' is unrecoverable; tried {}",
        .strategies_attempted.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    )]
    Unrecoverable {
        /// Document being recovered.
        path: PathBuf,
        /// Strategies tried, in order.
        strategies_attempted: Vec<RecoveryStrategy>,
    },
    /// A file or directory could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// Path being read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A document could not be written.
    #[error("failed to write '{path}': {source}")]
    Write {
        /// Path being written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A recovered document could not be encoded.
    #[error("failed to encode recovered '{path}': {source}")]
    Encode {
        /// Document being recovered.
        path: PathBuf,
        /// Encoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// A backup timestamp could not be rendered.
    #[error("failed to format backup timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

impl RecoveryError {
    pub(super) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(super) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

//! Lock identity and the on-disk lock file format.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Number of digest bytes kept in a lock id.
const LOCK_ID_BYTES: usize = 16;

/// Deterministic identifier derived from a resource path.
///
/// Every agent hashing the same path arrives at the same id, and therefore at
/// the same lock file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(String);

impl LockId {
    /// Derives the lock id for a resource path.
    #[must_use]
    pub fn for_resource(resource: &Path) -> Self {
        let digest = Sha256::digest(resource.as_os_str().as_encoded_bytes());
        let hex = digest
            .iter()
            .take(LOCK_ID_BYTES)
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        Self(hex)
    }

    /// Hex form of the id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the lock file guarding this id.
    pub(crate) fn lock_file_name(&self) -> String {
        format!("{}.lock", self.0)
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ownership metadata for a held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Deterministic id of the locked resource.
    pub lock_id: LockId,
    /// Resource the lock protects.
    pub resource_path: PathBuf,
    /// Agent that holds the lock.
    pub owner_agent_id: String,
    /// Process id of the holder.
    pub process_id: u32,
    /// Host the holder runs on.
    pub hostname: String,
    /// Instant the lock was taken.
    pub acquired_at: OffsetDateTime,
    /// Instant the holder's TTL runs out.
    pub expires_at: OffsetDateTime,
}

impl LockRecord {
    /// Whether the lock outlived `ttl` measured from acquisition.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration, now: OffsetDateTime) -> bool {
        self.acquired_at + ttl < now
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>, LockFileError> {
        let contents = LockFileContents {
            lock_id: self.lock_id.clone(),
            agent_id: self.owner_agent_id.clone(),
            resource_path: self.resource_path.clone(),
            acquired_at: self.acquired_at.format(&Rfc3339)?,
            expires_at: self.expires_at.format(&Rfc3339)?,
            pid: self.process_id,
            hostname: self.hostname.clone(),
        };
        let mut bytes = serde_json::to_vec_pretty(&contents)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub(crate) fn from_json(bytes: &[u8]) -> Result<Self, LockFileError> {
        let contents: LockFileContents = serde_json::from_slice(bytes)?;
        Ok(Self {
            lock_id: contents.lock_id,
            resource_path: contents.resource_path,
            owner_agent_id: contents.agent_id,
            process_id: contents.pid,
            hostname: contents.hostname,
            acquired_at: OffsetDateTime::parse(&contents.acquired_at, &Rfc3339)?,
            expires_at: OffsetDateTime::parse(&contents.expires_at, &Rfc3339)?,
        })
    }
}

/// Failure to encode or decode a lock file.
#[derive(Debug, thiserror::Error)]
pub enum LockFileError {
    /// The JSON body was malformed.
    #[error("malformed lock file: {0}")]
    Json(#[from] serde_json::Error),
    /// A timestamp could not be rendered.
    #[error("failed to format lock timestamp: {0}")]
    Format(#[from] time::error::Format),
    /// A timestamp could not be parsed.
    #[error("failed to parse lock timestamp: {0}")]
    Parse(#[from] time::error::Parse),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockFileContents {
    lock_id: LockId,
    agent_id: String,
    resource_path: PathBuf,
    acquired_at: String,
    expires_at: String,
    pid: u32,
    hostname: String,
}

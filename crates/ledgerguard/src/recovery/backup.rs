//! Backup naming and discovery.
//!
//! A backup of `ledger.json` taken at 2024-03-05 14:07:09.123456789 UTC is
//! `ledger.json.backup.2024-03-05T14-07-09-123456789Z`. The stamp is fixed
//! width, so lexical and chronological order agree.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

const MARKER: &str = ".backup.";

/// A backup copy of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    /// Document that was copied.
    pub original_path: PathBuf,
    /// Location of the copy.
    pub backup_path: PathBuf,
    /// Instant encoded in the copy's name.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Directory holding `path`, treating a bare file name as the working directory.
pub(super) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

pub(super) fn backup_path(
    original: &Path,
    at: OffsetDateTime,
) -> Result<PathBuf, time::error::Format> {
    let stamp = at.to_offset(UtcOffset::UTC).format(format_description!(
        "[year]-[month]-[day]T[hour]-[minute]-[second]-[subsecond digits:9]Z"
    ))?;
    let mut name = original
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(MARKER);
    name.push(stamp);
    Ok(original.with_file_name(name))
}

fn parse_stamp(original: &Path, candidate: &Path) -> Option<OffsetDateTime> {
    let original_name = original.file_name()?.to_str()?;
    let stamp = candidate
        .file_name()?
        .to_str()?
        .strip_prefix(original_name)?
        .strip_prefix(MARKER)?;
    PrimitiveDateTime::parse(
        stamp,
        format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]-[subsecond digits:9]Z"),
    )
    .ok()
    .map(PrimitiveDateTime::assume_utc)
}

/// Backups of `original`, newest first.
pub(super) fn list(original: &Path) -> io::Result<Vec<BackupRecord>> {
    let mut backups = Vec::new();
    for entry in fs::read_dir(parent_dir(original))? {
        let candidate = entry?.path();
        if let Some(timestamp) = parse_stamp(original, &candidate) {
            backups.push(BackupRecord {
                original_path: original.to_path_buf(),
                backup_path: candidate,
                timestamp,
            });
        }
    }
    backups.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
    Ok(backups)
}

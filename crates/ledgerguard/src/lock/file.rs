//! Filesystem primitives behind the lock manager.
//!
//! Every transition that must not race goes through create-if-absent. Lock
//! files are staged in a temporary sibling and linked into place with
//! `persist_noclobber`, so a reader either sees no lock file or a complete one.
//! Removal is serialised through a reclaim guard created with
//! `create_new`, so two removers can never both act on the same lock file.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::warn;

use super::LOCK_TARGET;

/// Publishes `contents` at `path` unless a file already exists there.
///
/// Returns `Ok(false)` when another file holds the path.
pub(super) fn create_exclusive(path: &Path, contents: &[u8]) -> io::Result<bool> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::Builder::new()
        .prefix(".staging-")
        .tempfile_in(parent)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    match staged.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(error) if error.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(error) => Err(error.error),
    }
}

/// Whether anything occupies `path`, without following symlinks.
pub(super) fn exists(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

/// Reads the raw lock file, or `None` when no lock file exists.
pub(super) fn read(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

/// Removes a file, treating absence as success.
pub(super) fn remove(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

/// Last modification time of a file, if it can be read.
pub(super) fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Exclusive right to remove one lock file.
///
/// The guard file sits beside the lock file and is deleted on drop.
#[derive(Debug)]
pub(super) struct ReclaimGuard {
    path: PathBuf,
}

impl ReclaimGuard {
    /// Guard path for a lock file.
    pub(super) fn path_for(lock_file: &Path) -> PathBuf {
        let mut name = lock_file.as_os_str().to_os_string();
        name.push(".reclaim");
        PathBuf::from(name)
    }

    /// Tries to take the guard for `lock_file`.
    ///
    /// A guard older than `abandoned_after` belongs to a remover that died
    /// mid-operation; it is cleared and the attempt repeated once.
    pub(super) fn try_acquire(lock_file: &Path, abandoned_after: Duration) -> io::Result<Option<Self>> {
        let path = Self::path_for(lock_file);
        if let Some(guard) = Self::create(&path)? {
            return Ok(Some(guard));
        }
        let abandoned = modified(&path)
            .and_then(|at| at.elapsed().ok())
            .is_some_and(|age| age > abandoned_after);
        if !abandoned {
            return Ok(None);
        }
        warn!(
            target: LOCK_TARGET,
            file = %path.display(),
            "clearing abandoned reclaim guard"
        );
        remove(&path)?;
        Self::create(&path)
    }

    fn create(path: &Path) -> io::Result<Option<Self>> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        match options.open(path) {
            Ok(_) => Ok(Some(Self {
                path: path.to_path_buf(),
            })),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl Drop for ReclaimGuard {
    fn drop(&mut self) {
        if let Err(error) = remove(&self.path) {
            warn!(
                target: LOCK_TARGET,
                file = %self.path.display(),
                error = %error,
                "failed to remove reclaim guard"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn create_exclusive_refuses_existing_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("a.lock");

        assert!(create_exclusive(&path, b"first").expect("first create"));
        assert!(!create_exclusive(&path, b"second").expect("second create"));
        assert_eq!(fs::read(&path).expect("read"), b"first");
    }

    #[test]
    fn create_exclusive_leaves_no_staging_files() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("a.lock");
        create_exclusive(&path, b"first").expect("first create");
        create_exclusive(&path, b"second").expect("second create");

        let entries = fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn exists_tracks_lock_file_presence() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("a.lock");
        assert!(!exists(&path).expect("absent"));

        fs::write(&path, b"held").expect("write");
        assert!(exists(&path).expect("present"));
    }

    #[test]
    fn read_missing_file_is_none() {
        let dir = TempDir::new().expect("temp dir");
        assert!(read(&dir.path().join("absent.lock")).expect("read").is_none());
    }

    #[test]
    fn reclaim_guard_is_exclusive_until_dropped() {
        let dir = TempDir::new().expect("temp dir");
        let lock = dir.path().join("a.lock");

        let guard = ReclaimGuard::try_acquire(&lock, Duration::from_secs(60))
            .expect("acquire")
            .expect("guard free");
        assert!(
            ReclaimGuard::try_acquire(&lock, Duration::from_secs(60))
                .expect("second acquire")
                .is_none()
        );

        drop(guard);
        assert!(!ReclaimGuard::path_for(&lock).exists());
        assert!(
            ReclaimGuard::try_acquire(&lock, Duration::from_secs(60))
                .expect("reacquire")
                .is_some()
        );
    }

    #[test]
    fn abandoned_reclaim_guard_is_cleared() {
        let dir = TempDir::new().expect("temp dir");
        let lock = dir.path().join("a.lock");
        fs::write(ReclaimGuard::path_for(&lock), b"").expect("plant guard");
        std::thread::sleep(Duration::from_millis(20));

        let guard = ReclaimGuard::try_acquire(&lock, Duration::from_millis(1)).expect("acquire");
        assert!(guard.is_some());
    }
}

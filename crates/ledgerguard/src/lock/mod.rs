//! File-based lock manager.
//!
//! Each protected resource maps to one lock file named after a deterministic
//! hash of its path. Acquisition is a cooperative poll: try an atomic
//! create-if-absent, and when the file already exists either reclaim it (its
//! TTL has elapsed or its owning process is gone) or sleep and retry until the
//! per-call timeout or the global retry budget runs out. There is no fairness
//! among waiters.
//!
//! The in-memory tables mirror what this manager has acquired and who is
//! waiting on what. They are never authoritative for ownership: release and
//! conflict checks always consult the lock file itself.
//!
//! ```text
//! UNLOCKED --acquire--> LOCKED(owner) --release / stale reclaim--> UNLOCKED
//! ```

mod conflict;
mod errors;
mod file;
mod graph;
mod record;
mod sweeper;


use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::{Pid, gethostname};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use ledgerguard_config::{Config, LogComponent};

use crate::context::LedgerContext;

pub use conflict::{
    AccessIntent, Conflict, ConflictReport, ConflictSeverity, Resolution, ResolutionStrategy,
    ResolutionStrategyParseError,
};
pub use errors::LockError;
pub use record::{LockFileError, LockId, LockRecord};

use file::ReclaimGuard;
use graph::WaitForGraph;
use sweeper::Sweeper;

pub(crate) const LOCK_TARGET: &str = LogComponent::Lock.target();

/// Holder name reported when a fresh lock file cannot be decoded.
const UNREADABLE_HOLDER: &str = "<unreadable>";

/// Holder name reported while another agent is reclaiming a stale lock.
const RECLAIM_IN_PROGRESS: &str = "reclaim in progress";

/// Proof of a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGrant {
    /// Ownership metadata written to the lock file.
    pub record: LockRecord,
    /// Path of the lock file.
    pub lock_file: PathBuf,
}

impl LockGrant {
    /// Id of the acquired lock.
    #[must_use]
    pub fn lock_id(&self) -> &LockId {
        &self.record.lock_id
    }

    /// Instant the lock was taken.
    #[must_use]
    pub fn acquired_at(&self) -> OffsetDateTime {
        self.record.acquired_at
    }

    /// Instant the lock's TTL runs out.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.record.expires_at
    }
}

/// A lock file removed because it was stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimedLock {
    /// Path of the removed lock file.
    pub lock_file: PathBuf,
    /// Previous owner, when the file could be decoded.
    pub record: Option<LockRecord>,
}

/// Snapshot of the locks held through this manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockStatistics {
    /// Number of locks currently held.
    pub active_locks: usize,
    /// Number of distinct agents holding at least one lock.
    pub agents_holding_locks: usize,
    /// Locks held per agent.
    pub locks_per_agent: BTreeMap<String, usize>,
}

/// Per-resource mutual exclusion over lock files.
///
/// The manager is `Sync`; agents in the same process share one instance
/// through an `Arc`, agents in other processes coordinate through the lock
/// directory.
#[derive(Debug)]
pub struct LockManager {
    shared: Arc<Shared>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl LockManager {
    /// Builds a manager and creates the lock directory.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] when the lock directory cannot be created.
    pub fn new(context: LedgerContext, config: &Config) -> Result<Self, LockError> {
        let directory = context.lock_directory().to_path_buf();
        fs::create_dir_all(&directory).map_err(|source| LockError::io(&directory, source))?;
        let shared = Shared {
            context,
            settings: LockSettings::from_config(config),
            hostname: local_hostname(),
            pid: std::process::id(),
            table: Mutex::new(LockTable::default()),
        };
        info!(
            target: LOCK_TARGET,
            directory = %directory.display(),
            ttl_ms = shared.settings.ttl.as_millis(),
            "lock manager ready"
        );
        Ok(Self {
            shared: Arc::new(shared),
            sweeper: Mutex::new(None),
        })
    }

    /// Lock id guarding `resource`.
    #[must_use]
    pub fn lock_id_for(&self, resource: impl AsRef<Path>) -> LockId {
        LockId::for_resource(&resource_key(resource.as_ref()))
    }

    /// Lock file guarding `resource`.
    #[must_use]
    pub fn lock_file_for(&self, resource: impl AsRef<Path>) -> PathBuf {
        self.shared.lock_file(&self.lock_id_for(resource))
    }

    /// Timeout used by callers that do not pick their own: the lock TTL.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.shared.settings.ttl
    }

    /// Acquires the lock on `resource` for `agent_id`.
    ///
    /// Re-acquiring a live lock the agent already owns succeeds and returns
    /// the existing grant.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] once `timeout` or the configured retry
    /// budget is exhausted, [`LockError::Deadlock`] when waiting would close
    /// a wait-for cycle, and [`LockError::Io`] on filesystem failures. No lock
    /// is held after an error.
    pub fn acquire_lock(
        &self,
        resource: impl AsRef<Path>,
        agent_id: &str,
        timeout: Duration,
    ) -> Result<LockGrant, LockError> {
        self.shared.acquire(resource.as_ref(), agent_id, timeout)
    }

    /// Releases the lock on `resource` held by `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Ownership`] when another agent holds the lock, in
    /// which case nothing is changed, and [`LockError::NotHeld`] when no lock
    /// exists. A lock of the agent's that has already gone stale is removed
    /// as a reclaim and also reports [`LockError::NotHeld`].
    pub fn release_lock(
        &self,
        resource: impl AsRef<Path>,
        agent_id: &str,
    ) -> Result<LockRecord, LockError> {
        self.shared.release(resource.as_ref(), agent_id)
    }

    /// Confirms that `agent_id` still owns a live lock on `resource`.
    ///
    /// Callers check this immediately before publishing writes made under
    /// the lock, since a lock that outlived its TTL may have been reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Ownership`] when another agent holds the lock,
    /// [`LockError::NotHeld`] when the lock is gone or has gone stale, and
    /// [`LockError::CorruptLockFile`] when the lock file cannot be decoded.
    pub fn verify_lock(
        &self,
        resource: impl AsRef<Path>,
        agent_id: &str,
    ) -> Result<LockRecord, LockError> {
        self.shared.verify(resource.as_ref(), agent_id)
    }

    /// Reports whether `agent_id` would conflict with the current holder.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::CorruptLockFile`] when the lock file cannot be
    /// decoded and [`LockError::Io`] when it cannot be read.
    pub fn detect_conflicts(
        &self,
        resource: impl AsRef<Path>,
        agent_id: &str,
        intent: AccessIntent,
    ) -> Result<ConflictReport, LockError> {
        self.shared.detect_conflicts(resource.as_ref(), agent_id, intent)
    }

    /// Applies a resolution policy to a conflict.
    #[must_use]
    pub fn resolve_conflict(&self, conflict: &Conflict, strategy: ResolutionStrategy) -> Resolution {
        let resolution = conflict::resolve(conflict, strategy);
        info!(
            target: LOCK_TARGET,
            resource = %conflict.resource_path.display(),
            strategy = %strategy,
            success = resolution.success,
            "conflict resolution applied"
        );
        resolution
    }

    /// Records that `agent_id` is blocked on `lock_id`.
    pub fn add_lock_dependency(&self, agent_id: &str, lock_id: LockId) {
        self.shared.table().waits.add(agent_id, lock_id);
    }

    /// Removes a wait-for edge.
    pub fn remove_lock_dependency(&self, agent_id: &str, lock_id: &LockId) {
        self.shared.table().waits.remove(agent_id, lock_id);
    }

    /// Returns the wait-for cycle reachable from `agent_id`, if any.
    #[must_use]
    pub fn detect_deadlock(&self, agent_id: &str) -> Option<Vec<String>> {
        self.shared.find_cycle(agent_id)
    }

    /// Removes every stale lock file in the lock directory.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] when the lock directory cannot be listed or
    /// a stale file cannot be removed.
    pub fn cleanup_stale_locks(&self) -> Result<Vec<ReclaimedLock>, LockError> {
        self.shared.cleanup_stale_locks()
    }

    /// Starts the background sweeper at the configured interval.
    ///
    /// Returns `false` when a sweeper is already running.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] when the sweeper thread cannot be spawned.
    pub fn start_stale_sweeper(&self) -> Result<bool, LockError> {
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(false);
        }
        let interval = self.shared.settings.sweep_interval;
        let sweeper = Sweeper::spawn(Arc::clone(&self.shared), interval)
            .map_err(|source| LockError::io(self.shared.context.lock_directory(), source))?;
        *slot = Some(sweeper);
        debug!(
            target: LOCK_TARGET,
            interval_ms = interval.as_millis(),
            "stale lock sweeper started"
        );
        Ok(true)
    }

    /// Stops the background sweeper. Returns `false` when none was running.
    #[must_use]
    pub fn stop_stale_sweeper(&self) -> bool {
        self.halt_sweeper()
    }

    /// Locks held through this manager.
    #[must_use]
    pub fn get_statistics(&self) -> LockStatistics {
        self.shared.table().statistics()
    }

    /// Stops the sweeper and forgets in-memory state.
    ///
    /// Lock files stay on disk: they may belong to live agents elsewhere.
    pub fn cleanup(&self) {
        self.halt_sweeper();
        self.shared.table().clear();
    }

    fn halt_sweeper(&self) -> bool {
        let running = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(sweeper) = running else {
            return false;
        };
        sweeper.stop();
        debug!(target: LOCK_TARGET, "stale lock sweeper stopped");
        true
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.halt_sweeper();
    }
}

#[derive(Debug, Clone, Copy)]
struct LockSettings {
    ttl: Duration,
    retry_interval: Duration,
    max_retries: u32,
    deadlock_detection: bool,
    check_liveness: bool,
    sweep_interval: Duration,
}

impl LockSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            ttl: config.lock_ttl(),
            retry_interval: config.lock_retry_interval(),
            max_retries: config.max_retries(),
            deadlock_detection: config.deadlock_detection_enabled(),
            check_liveness: config.check_owner_liveness(),
            sweep_interval: config.stale_sweep_interval(),
        }
    }
}

#[derive(Debug, Default)]
struct LockTable {
    active: HashMap<LockId, LockRecord>,
    by_agent: BTreeMap<String, BTreeSet<LockId>>,
    waits: WaitForGraph,
}

impl LockTable {
    fn register(&mut self, record: LockRecord) {
        self.by_agent
            .entry(record.owner_agent_id.clone())
            .or_default()
            .insert(record.lock_id.clone());
        self.active.insert(record.lock_id.clone(), record);
    }

    fn forget(&mut self, lock_id: &LockId) {
        if let Some(record) = self.active.remove(lock_id)
            && let Some(locks) = self.by_agent.get_mut(&record.owner_agent_id)
        {
            locks.remove(lock_id);
            if locks.is_empty() {
                self.by_agent.remove(&record.owner_agent_id);
            }
        }
    }

    fn statistics(&self) -> LockStatistics {
        LockStatistics {
            active_locks: self.active.len(),
            agents_holding_locks: self.by_agent.len(),
            locks_per_agent: self
                .by_agent
                .iter()
                .map(|(agent, locks)| (agent.clone(), locks.len()))
                .collect(),
        }
    }

    fn clear(&mut self) {
        self.active.clear();
        self.by_agent.clear();
        self.waits.clear();
    }
}

/// What currently occupies a lock file path.
#[derive(Debug)]
enum Holder {
    Vacant,
    Live(LockRecord),
    /// Expired, orphaned, or an undecodable file older than the TTL.
    Stale(Option<LockRecord>),
    /// An undecodable file younger than the TTL.
    Corrupt(LockFileError),
}

enum Attempt {
    Granted(LockGrant),
    Retry,
    Blocked(String),
}

/// Resource identity shared by every operation on one lock.
struct Target {
    resource: PathBuf,
    lock_id: LockId,
    lock_file: PathBuf,
}

#[derive(Debug)]
pub(super) struct Shared {
    context: LedgerContext,
    settings: LockSettings,
    hostname: String,
    pid: u32,
    table: Mutex<LockTable>,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_file(&self, lock_id: &LockId) -> PathBuf {
        self.context
            .lock_directory()
            .join(lock_id.lock_file_name())
    }

    fn target(&self, resource: &Path) -> Target {
        let key = resource_key(resource);
        let lock_id = LockId::for_resource(&key);
        let lock_file = self.lock_file(&lock_id);
        Target {
            resource: key,
            lock_id,
            lock_file,
        }
    }

    fn acquire(
        &self,
        resource: &Path,
        agent_id: &str,
        timeout: Duration,
    ) -> Result<LockGrant, LockError> {
        let target = self.target(resource);
        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut waiting = false;

        let outcome = loop {
            attempts = attempts.saturating_add(1);
            let holder = match self.attempt(&target, agent_id) {
                Ok(Attempt::Granted(grant)) => break Ok(grant),
                Ok(Attempt::Retry) => None,
                Ok(Attempt::Blocked(owner)) => Some(owner),
                Err(error) => break Err(error),
            };

            if holder.is_some() && self.settings.deadlock_detection {
                if !waiting {
                    self.table().waits.add(agent_id, target.lock_id.clone());
                    waiting = true;
                }
                if let Some(cycle) = self.find_cycle(agent_id)
                    && cycle.iter().any(|member| member == agent_id)
                {
                    self.context.reporter().deadlock_detected(agent_id, &cycle);
                    break Err(LockError::Deadlock {
                        resource: target.resource.clone(),
                        agent: agent_id.to_string(),
                        cycle,
                    });
                }
            }

            let waited = started.elapsed();
            if attempts >= self.settings.max_retries || waited >= timeout {
                break Err(LockError::Timeout {
                    resource: target.resource.clone(),
                    attempts,
                    waited,
                    holder: holder.unwrap_or_else(|| "unknown".to_string()),
                });
            }
            if holder.is_some() {
                thread::sleep(self.settings.retry_interval.min(timeout - waited));
            }
        };

        if waiting {
            self.table().waits.remove(agent_id, &target.lock_id);
        }
        if let Err(error) = &outcome {
            debug!(
                target: LOCK_TARGET,
                resource = %target.resource.display(),
                agent = agent_id,
                attempts,
                error = %error,
                "lock acquisition failed"
            );
        }
        outcome
    }

    fn attempt(&self, target: &Target, agent_id: &str) -> Result<Attempt, LockError> {
        if file::exists(&target.lock_file)
            .map_err(|source| LockError::io(&target.lock_file, source))?
        {
            return self.contend(target, agent_id);
        }
        let now = self.context.now();
        let record = LockRecord {
            lock_id: target.lock_id.clone(),
            resource_path: target.resource.clone(),
            owner_agent_id: agent_id.to_string(),
            process_id: self.pid,
            hostname: self.hostname.clone(),
            acquired_at: now,
            expires_at: now + self.settings.ttl,
        };
        let contents = record
            .to_json()
            .map_err(|source| LockError::CorruptLockFile {
                path: target.lock_file.clone(),
                source,
            })?;
        let created = file::create_exclusive(&target.lock_file, &contents)
            .map_err(|source| LockError::io(&target.lock_file, source))?;
        if created {
            self.table().register(record.clone());
            self.context.reporter().lock_acquired(&record);
            return Ok(Attempt::Granted(LockGrant {
                record,
                lock_file: target.lock_file.clone(),
            }));
        }
        self.contend(target, agent_id)
    }

    /// Classifies an occupied lock file for an acquisition attempt.
    fn contend(&self, target: &Target, agent_id: &str) -> Result<Attempt, LockError> {
        match self.inspect(&target.lock_file)? {
            Holder::Vacant => Ok(Attempt::Retry),
            Holder::Stale(_) => match self.reclaim(&target.lock_file)? {
                Some(_) => Ok(Attempt::Retry),
                // Another agent holds the reclaim guard; back off like any
                // other contended attempt.
                None => Ok(Attempt::Blocked(RECLAIM_IN_PROGRESS.to_string())),
            },
            Holder::Live(existing) if existing.owner_agent_id == agent_id => {
                self.table().register(existing.clone());
                Ok(Attempt::Granted(LockGrant {
                    record: existing,
                    lock_file: target.lock_file.clone(),
                }))
            }
            Holder::Live(existing) => Ok(Attempt::Blocked(existing.owner_agent_id)),
            Holder::Corrupt(_) => Ok(Attempt::Blocked(UNREADABLE_HOLDER.to_string())),
        }
    }

    fn release(&self, resource: &Path, agent_id: &str) -> Result<LockRecord, LockError> {
        let target = self.target(resource);
        let _guard = self.wait_for_guard(&target)?;

        let contents = file::read(&target.lock_file)
            .map_err(|source| LockError::io(&target.lock_file, source))?;
        let Some(bytes) = contents else {
            self.forget_if_owned(&target.lock_id, agent_id);
            return Err(LockError::NotHeld {
                resource: target.resource,
            });
        };
        let record =
            LockRecord::from_json(&bytes).map_err(|source| LockError::CorruptLockFile {
                path: target.lock_file.clone(),
                source,
            })?;
        if record.owner_agent_id != agent_id {
            self.forget_if_owned(&target.lock_id, agent_id);
            return Err(LockError::Ownership {
                resource: target.resource,
                requester: agent_id.to_string(),
                holder: record.owner_agent_id,
            });
        }

        file::remove(&target.lock_file)
            .map_err(|source| LockError::io(&target.lock_file, source))?;
        self.table().forget(&target.lock_id);
        if self.is_stale(&record, self.context.now()) {
            // The lock lapsed before release: the agent no longer owned it,
            // so the file is reclaimed instead.
            self.context
                .reporter()
                .stale_lock_reclaimed(&target.lock_file, Some(&record));
            return Err(LockError::NotHeld {
                resource: target.resource,
            });
        }
        self.context.reporter().lock_released(&record);
        Ok(record)
    }

    fn verify(&self, resource: &Path, agent_id: &str) -> Result<LockRecord, LockError> {
        let target = self.target(resource);
        match self.inspect(&target.lock_file)? {
            Holder::Live(record) if record.owner_agent_id == agent_id => Ok(record),
            Holder::Live(record) => Err(LockError::Ownership {
                resource: target.resource,
                requester: agent_id.to_string(),
                holder: record.owner_agent_id,
            }),
            Holder::Vacant | Holder::Stale(_) => Err(LockError::NotHeld {
                resource: target.resource,
            }),
            Holder::Corrupt(source) => Err(LockError::CorruptLockFile {
                path: target.lock_file,
                source,
            }),
        }
    }

    /// Drops an in-memory mirror entry that no longer matches the lock file.
    fn forget_if_owned(&self, lock_id: &LockId, agent_id: &str) {
        let mut table = self.table();
        let owned = table
            .active
            .get(lock_id)
            .is_some_and(|record| record.owner_agent_id == agent_id);
        if owned {
            table.forget(lock_id);
        }
    }

    fn wait_for_guard(&self, target: &Target) -> Result<ReclaimGuard, LockError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            let claimed = ReclaimGuard::try_acquire(&target.lock_file, self.settings.ttl)
                .map_err(|source| LockError::io(&target.lock_file, source))?;
            if let Some(guard) = claimed {
                return Ok(guard);
            }
            if attempts >= self.settings.max_retries {
                return Err(LockError::Timeout {
                    resource: target.resource.clone(),
                    attempts,
                    waited: started.elapsed(),
                    holder: RECLAIM_IN_PROGRESS.to_string(),
                });
            }
            thread::sleep(self.settings.retry_interval);
        }
    }

    fn detect_conflicts(
        &self,
        resource: &Path,
        agent_id: &str,
        intent: AccessIntent,
    ) -> Result<ConflictReport, LockError> {
        let target = self.target(resource);
        match self.inspect(&target.lock_file)? {
            Holder::Vacant | Holder::Stale(_) => Ok(ConflictReport::clear()),
            Holder::Live(record) if record.owner_agent_id == agent_id => {
                Ok(ConflictReport::clear())
            }
            Holder::Live(record) => Ok(ConflictReport::contended(Conflict::new(
                target.resource,
                target.lock_id,
                record.owner_agent_id,
                agent_id,
                intent,
            ))),
            Holder::Corrupt(source) => Err(LockError::CorruptLockFile {
                path: target.lock_file,
                source,
            }),
        }
    }

    fn inspect(&self, lock_file: &Path) -> Result<Holder, LockError> {
        let contents = file::read(lock_file).map_err(|source| LockError::io(lock_file, source))?;
        let Some(bytes) = contents else {
            return Ok(Holder::Vacant);
        };
        let now = self.context.now();
        match LockRecord::from_json(&bytes) {
            Ok(record) if self.is_stale(&record, now) => Ok(Holder::Stale(Some(record))),
            Ok(record) => Ok(Holder::Live(record)),
            Err(source) => {
                let abandoned = file::modified(lock_file)
                    .map(OffsetDateTime::from)
                    .is_some_and(|modified| modified + self.settings.ttl < now);
                if abandoned {
                    Ok(Holder::Stale(None))
                } else {
                    Ok(Holder::Corrupt(source))
                }
            }
        }
    }

    fn is_stale(&self, record: &LockRecord, now: OffsetDateTime) -> bool {
        record.is_expired(self.settings.ttl, now)
            || (self.settings.check_liveness && !self.owner_alive(record))
    }

    fn owner_alive(&self, record: &LockRecord) -> bool {
        if record.hostname != self.hostname || record.process_id == self.pid {
            return true;
        }
        process_alive(record.process_id)
    }

    /// Removes `lock_file` if it is still stale once the reclaim guard is held.
    fn reclaim(&self, lock_file: &Path) -> Result<Option<ReclaimedLock>, LockError> {
        let guard = ReclaimGuard::try_acquire(lock_file, self.settings.ttl)
            .map_err(|source| LockError::io(lock_file, source))?;
        let Some(_guard) = guard else {
            return Ok(None);
        };
        let Holder::Stale(record) = self.inspect(lock_file)? else {
            return Ok(None);
        };
        file::remove(lock_file).map_err(|source| LockError::io(lock_file, source))?;
        if let Some(previous) = &record {
            let mut table = self.table();
            if table.active.get(&previous.lock_id) == Some(previous) {
                table.forget(&previous.lock_id);
            }
        }
        self.context
            .reporter()
            .stale_lock_reclaimed(lock_file, record.as_ref());
        Ok(Some(ReclaimedLock {
            lock_file: lock_file.to_path_buf(),
            record,
        }))
    }

    fn cleanup_stale_locks(&self) -> Result<Vec<ReclaimedLock>, LockError> {
        let directory = self.context.lock_directory();
        let entries =
            fs::read_dir(directory).map_err(|source| LockError::io(directory, source))?;
        let mut reclaimed = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| LockError::io(directory, source))?
                .path();
            if path.extension().is_none_or(|extension| extension != "lock") {
                continue;
            }
            if matches!(self.inspect(&path)?, Holder::Stale(_))
                && let Some(lock) = self.reclaim(&path)?
            {
                reclaimed.push(lock);
            }
        }
        Ok(reclaimed)
    }

    fn find_cycle(&self, agent_id: &str) -> Option<Vec<String>> {
        let graph = self.table().waits.clone();
        let owners = graph
            .awaited_locks()
            .into_iter()
            .filter_map(|lock_id| match self.inspect(&self.lock_file(&lock_id)) {
                Ok(Holder::Live(record)) => Some((lock_id, record.owner_agent_id)),
                _ => None,
            })
            .collect::<HashMap<_, _>>();
        graph.find_cycle(agent_id, &owners)
    }
}

/// Canonical key for a resource: absolute, without resolving symlinks.
fn resource_key(resource: &Path) -> PathBuf {
    std::path::absolute(resource).unwrap_or_else(|_| resource.to_path_buf())
}

fn local_hostname() -> String {
    gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return true;
    };
    if raw <= 0 {
        return true;
    }
    match kill(Pid::from_raw(raw), None) {
        Err(Errno::ESRCH) => false,
        Ok(()) | Err(_) => true,
    }
}

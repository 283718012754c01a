//! Structured reporting for lock and pipeline lifecycle events.

use std::path::Path;
use std::sync::Arc;

use crate::lock::{LOCK_TARGET, LockRecord};
use crate::orchestrator::{FixSessionReport, ORCHESTRATOR_TARGET};
use crate::recovery::{BackupRecord, RECOVERY_TARGET, RecoveryStrategy};

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait PipelineReporter: Send + Sync {
    /// Invoked after a lock file is created for an agent.
    fn lock_acquired(&self, record: &LockRecord);

    /// Invoked after the owner releases a lock.
    fn lock_released(&self, record: &LockRecord);

    /// Invoked after an expired or orphaned lock file is removed.
    fn stale_lock_reclaimed(&self, lock_file: &Path, record: Option<&LockRecord>);

    /// Invoked when a waiting agent closes a wait-for cycle.
    fn deadlock_detected(&self, agent_id: &str, cycle: &[String]);

    /// Invoked after a backup is written.
    fn backup_created(&self, record: &BackupRecord);

    /// Invoked after a corrupted document is recovered.
    fn file_recovered(&self, path: &Path, strategy: RecoveryStrategy);

    /// Invoked when a fix session is finalised.
    fn session_finished(&self, report: &FixSessionReport);
}

impl<T> PipelineReporter for Arc<T>
where
    T: PipelineReporter,
{
    fn lock_acquired(&self, record: &LockRecord) {
        (**self).lock_acquired(record);
    }

    fn lock_released(&self, record: &LockRecord) {
        (**self).lock_released(record);
    }

    fn stale_lock_reclaimed(&self, lock_file: &Path, record: Option<&LockRecord>) {
        (**self).stale_lock_reclaimed(lock_file, record);
    }

    fn deadlock_detected(&self, agent_id: &str, cycle: &[String]) {
        (**self).deadlock_detected(agent_id, cycle);
    }

    fn backup_created(&self, record: &BackupRecord) {
        (**self).backup_created(record);
    }

    fn file_recovered(&self, path: &Path, strategy: RecoveryStrategy) {
        (**self).file_recovered(path, strategy);
    }

    fn session_finished(&self, report: &FixSessionReport) {
        (**self).session_finished(report);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredReporter;

impl StructuredReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PipelineReporter for StructuredReporter {
    fn lock_acquired(&self, record: &LockRecord) {
        tracing::info!(
            target: LOCK_TARGET,
            event = "lock_acquired",
            lock_id = %record.lock_id,
            resource = %record.resource_path.display(),
            agent = %record.owner_agent_id,
            "lock acquired"
        );
    }

    fn lock_released(&self, record: &LockRecord) {
        tracing::info!(
            target: LOCK_TARGET,
            event = "lock_released",
            lock_id = %record.lock_id,
            resource = %record.resource_path.display(),
            agent = %record.owner_agent_id,
            "lock released"
        );
    }

    fn stale_lock_reclaimed(&self, lock_file: &Path, record: Option<&LockRecord>) {
        tracing::warn!(
            target: LOCK_TARGET,
            event = "stale_lock_reclaimed",
            file = %lock_file.display(),
            previous_owner = record.map(|r| r.owner_agent_id.as_str()),
            previous_pid = record.map(|r| r.process_id),
            "reclaimed stale lock"
        );
    }

    fn deadlock_detected(&self, agent_id: &str, cycle: &[String]) {
        tracing::error!(
            target: LOCK_TARGET,
            event = "deadlock_detected",
            agent = agent_id,
            cycle = %cycle.join(" -> "),
            "deadlock detected"
        );
    }

    fn backup_created(&self, record: &BackupRecord) {
        tracing::info!(
            target: RECOVERY_TARGET,
            event = "backup_created",
            original = %record.original_path.display(),
            backup = %record.backup_path.display(),
            "backup created"
        );
    }

    fn file_recovered(&self, path: &Path, strategy: RecoveryStrategy) {
        tracing::warn!(
            target: RECOVERY_TARGET,
            event = "file_recovered",
            file = %path.display(),
            strategy = %strategy,
            "recovered corrupted document"
        );
    }

    fn session_finished(&self, report: &FixSessionReport) {
        tracing::info!(
            target: ORCHESTRATOR_TARGET,
            event = "session_finished",
            session = %report.session_id,
            total_errors = report.total_errors,
            errors_fixed = report.errors_fixed,
            fixes_applied = report.fixes_applied.len(),
            has_changes = report.has_changes,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "fix session finished"
        );
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use recording::{RecordingReporter, ReporterEvent};

#[cfg(any(test, feature = "test-support"))]
mod recording {
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, PoisonError};

    use super::PipelineReporter;
    use crate::lock::LockRecord;
    use crate::orchestrator::FixSessionReport;
    use crate::recovery::{BackupRecord, RecoveryStrategy};

    /// Lifecycle events captured by [`RecordingReporter`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ReporterEvent {
        /// A lock was acquired by the named agent.
        LockAcquired(String),
        /// A lock was released by the named agent.
        LockReleased(String),
        /// A stale lock file was removed.
        StaleLockReclaimed(PathBuf),
        /// A deadlock cycle was observed.
        DeadlockDetected(Vec<String>),
        /// A backup was written.
        BackupCreated(PathBuf),
        /// A document was recovered with the given strategy.
        FileRecovered(RecoveryStrategy),
        /// A fix session finished.
        SessionFinished(String),
    }

    /// Records reporter events for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingReporter {
        events: Mutex<Vec<ReporterEvent>>,
    }

    impl RecordingReporter {
        /// Captures a copy of the recorded events.
        #[must_use]
        pub fn events(&self) -> Vec<ReporterEvent> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn record(&self, event: ReporterEvent) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }
    }

    impl PipelineReporter for RecordingReporter {
        fn lock_acquired(&self, record: &LockRecord) {
            self.record(ReporterEvent::LockAcquired(record.owner_agent_id.clone()));
        }

        fn lock_released(&self, record: &LockRecord) {
            self.record(ReporterEvent::LockReleased(record.owner_agent_id.clone()));
        }

        fn stale_lock_reclaimed(&self, lock_file: &Path, _record: Option<&LockRecord>) {
            self.record(ReporterEvent::StaleLockReclaimed(lock_file.to_path_buf()));
        }

        fn deadlock_detected(&self, _agent_id: &str, cycle: &[String]) {
            self.record(ReporterEvent::DeadlockDetected(cycle.to_vec()));
        }

        fn backup_created(&self, record: &BackupRecord) {
            self.record(ReporterEvent::BackupCreated(record.backup_path.clone()));
        }

        fn file_recovered(&self, _path: &Path, strategy: RecoveryStrategy) {
            self.record(ReporterEvent::FileRecovered(strategy));
        }

        fn session_finished(&self, report: &FixSessionReport) {
            self.record(ReporterEvent::SessionFinished(report.session_id.clone()));
        }
    }
}

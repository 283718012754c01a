//! Runtime context handed to every component at construction.
//!
//! Components never reach for process-wide state: the lock directory, the
//! clock used for TTL arithmetic and backup timestamps, and the reporter that
//! receives lifecycle events all travel in a [`LedgerContext`]. Tests swap in
//! a manual clock to drive expiry without sleeping.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(any(test, feature = "test-support"))]
use std::sync::{Mutex, PoisonError};
#[cfg(any(test, feature = "test-support"))]
use std::time::Duration;

use time::OffsetDateTime;

use ledgerguard_config::Config;

use crate::reporter::{PipelineReporter, StructuredReporter};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC instant.
    fn now(&self) -> OffsetDateTime;
}

/// Clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

#[cfg(any(test, feature = "test-support"))]
impl ManualClock {
    /// Builds a clock frozen at `start`.
    #[must_use]
    pub fn starting_at(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Builds a clock frozen at the current system time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::starting_at(OffsetDateTime::now_utc())
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared collaborators for the lock manager, backup service and orchestrator.
#[derive(Clone)]
pub struct LedgerContext {
    lock_directory: PathBuf,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn PipelineReporter>,
}

impl LedgerContext {
    /// Builds a context rooted at `lock_directory` using the system clock and
    /// the tracing-backed reporter.
    #[must_use]
    pub fn new(lock_directory: impl Into<PathBuf>) -> Self {
        Self {
            lock_directory: lock_directory.into(),
            clock: Arc::new(SystemClock),
            reporter: Arc::new(StructuredReporter::new()),
        }
    }

    /// Builds a context from the configured lock directory.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.lock_directory().as_std_path())
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn PipelineReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Directory holding lock files.
    #[must_use]
    pub fn lock_directory(&self) -> &Path {
        &self.lock_directory
    }

    /// Current instant according to the context clock.
    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Clock shared with collaborators built from this context.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Reporter receiving lifecycle events.
    #[must_use]
    pub fn reporter(&self) -> &dyn PipelineReporter {
        self.reporter.as_ref()
    }
}

impl fmt::Debug for LedgerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerContext")
            .field("lock_directory", &self.lock_directory)
            .finish_non_exhaustive()
    }
}

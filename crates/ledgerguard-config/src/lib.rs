//! Construction-time configuration shared by the ledgerguard components.
//!
//! Every setting has a default and can be changed independently through the
//! `with_*` builders, or loaded from a JSON document whose missing keys fall
//! back to those defaults:
//!
//! ```json
//! { "lock_directory": "/var/run/ledger/.locks", "auto_fix_level": "aggressive" }
//! ```
//!
//! The configuration is immutable once handed to a component; components
//! read it through the accessor methods.

mod defaults;
mod fix_level;
mod logging;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOCK_DIRECTORY, DEFAULT_LOCK_RETRY_INTERVAL_MS, DEFAULT_LOCK_TIMEOUT_MS,
    DEFAULT_LOG_FILTER, DEFAULT_MAX_FIX_ATTEMPTS, DEFAULT_MAX_RETRIES,
    DEFAULT_STALE_SWEEP_INTERVAL_MS, default_auto_fix_level, default_lock_directory,
    default_log_filter, default_log_filter_string, default_log_format,
};
pub use fix_level::{AutoFixLevel, AutoFixLevelParseError};
pub use logging::{LogComponent, LogFormat, LogFormatParseError};

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    Read {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration file did not contain a valid configuration document.
    #[error("failed to parse configuration '{path}': {source}")]
    Parse {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Settings for the lock manager, backup service and fix pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    lock_directory: Utf8PathBuf,
    lock_timeout_ms: u64,
    lock_retry_interval_ms: u64,
    max_retries: u32,
    enable_deadlock_detection: bool,
    check_owner_liveness: bool,
    stale_sweep_interval_ms: u64,
    auto_fix_level: AutoFixLevel,
    create_backups: bool,
    validate_after_fix: bool,
    max_fix_attempts: u32,
    agent_id: Option<String>,
    log_filter: String,
    log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_directory: default_lock_directory(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            lock_retry_interval_ms: DEFAULT_LOCK_RETRY_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            enable_deadlock_detection: true,
            check_owner_liveness: true,
            stale_sweep_interval_ms: DEFAULT_STALE_SWEEP_INTERVAL_MS,
            auto_fix_level: default_auto_fix_level(),
            create_backups: true,
            validate_after_fix: true,
            max_fix_attempts: DEFAULT_MAX_FIX_ATTEMPTS,
            agent_id: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Parses a configuration document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error when the text is not a valid
    /// configuration document.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Loads a configuration document from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not a valid configuration document.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = path.as_ref();
        let text = fs::read_to_string(file).map_err(|source| ConfigError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| ConfigError::Parse {
            path: file.to_path_buf(),
            source,
        })
    }

    /// Directory holding lock files.
    #[must_use]
    pub fn lock_directory(&self) -> &Utf8Path {
        self.lock_directory.as_path()
    }

    /// Time-to-live after which an unreleased lock is stale.
    #[must_use]
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Pause between lock acquisition attempts.
    #[must_use]
    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    /// Upper bound on acquisition attempts per call.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether contended acquisitions run wait-for-graph deadlock detection.
    #[must_use]
    pub fn deadlock_detection_enabled(&self) -> bool {
        self.enable_deadlock_detection
    }

    /// Whether locks written on this host are checked for a live owning PID.
    #[must_use]
    pub fn check_owner_liveness(&self) -> bool {
        self.check_owner_liveness
    }

    /// Interval between background stale-lock sweeps.
    #[must_use]
    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.stale_sweep_interval_ms)
    }

    /// Policy selecting which fixes are applied automatically.
    #[must_use]
    pub fn auto_fix_level(&self) -> AutoFixLevel {
        self.auto_fix_level
    }

    /// Whether the fix pipeline backs up the document before mutating it.
    #[must_use]
    pub fn create_backups(&self) -> bool {
        self.create_backups
    }

    /// Whether a confirmation validation pass follows each fix pass.
    #[must_use]
    pub fn validate_after_fix(&self) -> bool {
        self.validate_after_fix
    }

    /// Upper bound on fix passes performed by one pipeline call.
    #[must_use]
    pub fn max_fix_attempts(&self) -> u32 {
        self.max_fix_attempts
    }

    /// Identity the fix pipeline uses when taking locks, if configured.
    #[must_use]
    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    /// Log filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log filter with component shorthands expanded to their targets.
    ///
    /// `"info,lock=debug"` becomes `"info,ledgerguard::lock=debug"`; see
    /// [`LogComponent`].
    #[must_use]
    pub fn effective_log_filter(&self) -> String {
        logging::expand_filter(&self.log_filter)
    }

    /// Output format for the tracing subscriber.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Sets the lock directory.
    #[must_use]
    pub fn with_lock_directory(mut self, directory: impl Into<Utf8PathBuf>) -> Self {
        self.lock_directory = directory.into();
        self
    }

    /// Sets the lock time-to-live.
    #[must_use]
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_timeout_ms = duration_millis(ttl);
        self
    }

    /// Sets the pause between acquisition attempts.
    #[must_use]
    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval_ms = duration_millis(interval);
        self
    }

    /// Sets the maximum number of acquisition attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enables or disables deadlock detection.
    #[must_use]
    pub fn with_deadlock_detection(mut self, enabled: bool) -> Self {
        self.enable_deadlock_detection = enabled;
        self
    }

    /// Enables or disables the owner PID liveness check.
    #[must_use]
    pub fn with_owner_liveness_check(mut self, enabled: bool) -> Self {
        self.check_owner_liveness = enabled;
        self
    }

    /// Sets the interval between background stale-lock sweeps.
    #[must_use]
    pub fn with_stale_sweep_interval(mut self, interval: Duration) -> Self {
        self.stale_sweep_interval_ms = duration_millis(interval);
        self
    }

    /// Sets the auto-fix level.
    #[must_use]
    pub fn with_auto_fix_level(mut self, level: AutoFixLevel) -> Self {
        self.auto_fix_level = level;
        self
    }

    /// Enables or disables pre-mutation backups.
    #[must_use]
    pub fn with_create_backups(mut self, enabled: bool) -> Self {
        self.create_backups = enabled;
        self
    }

    /// Enables or disables the confirmation validation pass.
    #[must_use]
    pub fn with_validate_after_fix(mut self, enabled: bool) -> Self {
        self.validate_after_fix = enabled;
        self
    }

    /// Sets the maximum number of fix passes.
    #[must_use]
    pub fn with_max_fix_attempts(mut self, attempts: u32) -> Self {
        self.max_fix_attempts = attempts;
        self
    }

    /// Sets the identity used by the fix pipeline when taking locks.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets the log filter expression.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Sets the log output format.
    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

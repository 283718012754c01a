use camino::Utf8PathBuf;

use crate::fix_level::AutoFixLevel;
use crate::logging::LogFormat;

/// Lock directory used when none is configured, relative to the working directory.
pub const DEFAULT_LOCK_DIRECTORY: &str = "./.locks";

/// Lock time-to-live in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Pause between lock acquisition attempts in milliseconds.
pub const DEFAULT_LOCK_RETRY_INTERVAL_MS: u64 = 10;

/// Upper bound on lock acquisition attempts per call.
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Upper bound on fix passes performed by a single pipeline call.
pub const DEFAULT_MAX_FIX_ATTEMPTS: u32 = 3;

/// Interval between background stale-lock sweeps in milliseconds.
pub const DEFAULT_STALE_SWEEP_INTERVAL_MS: u64 = 30_000;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default lock directory as an owned path.
pub fn default_lock_directory() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_LOCK_DIRECTORY)
}

/// Default log filter expression.
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format.
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default auto-fix level.
pub const fn default_auto_fix_level() -> AutoFixLevel {
    AutoFixLevel::Moderate
}

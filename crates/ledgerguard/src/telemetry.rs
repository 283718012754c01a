//! Structured telemetry initialisation for embedding applications.
//!
//! Library code only emits `tracing` events, each component under its own
//! target (see [`LogComponent`]). Binaries and test harnesses that want those
//! events on stderr call [`initialise`] once with their [`Config`]; the log
//! filter may use component shorthands such as `lock=debug`.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

use ledgerguard_config::{Config, LogComponent, LogFormat};

static INSTALLED: OnceCell<TelemetryHandle> = OnceCell::new();

/// What the installed subscriber was configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    filter: String,
    format: LogFormat,
}

impl TelemetryHandle {
    /// Filter directives in effect, component shorthands expanded.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Output format in effect.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }

    /// Whether the filter names `component` explicitly.
    #[must_use]
    pub fn targets(&self, component: LogComponent) -> bool {
        self.filter
            .split(',')
            .any(|directive| directive.split('=').next() == Some(component.target()))
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The expanded log filter did not parse.
    #[error("invalid log filter '{directives}': {message}")]
    Filter {
        /// Directives after component shorthands were expanded.
        directives: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another global subscriber was installed first.
    #[error("failed to install telemetry subscriber: {0}")]
    Install(#[source] TryInitError),
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls return the handle of the first installation whatever
/// configuration they pass.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the log filter does not parse and
/// [`TelemetryError::Install`] when a subscriber from elsewhere is already
/// installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED.get_or_try_init(|| install(config)).cloned()
}

fn component_filter(config: &Config) -> Result<(String, EnvFilter), TelemetryError> {
    let directives = config.effective_log_filter();
    match EnvFilter::try_new(&directives) {
        Ok(filter) => Ok((directives, filter)),
        Err(error) => Err(TelemetryError::Filter {
            message: error.to_string(),
            directives,
        }),
    }
}

fn install(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let (directives, filter) = component_filter(config)?;
    let timer = fmt::time::UtcTime::rfc_3339();
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.log_format() {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(io::stderr)
                    .with_timer(timer),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_thread_names(true)
                    .with_writer(io::stderr)
                    .with_ansi(io::stderr().is_terminal())
                    .with_timer(timer),
            )
            .try_init(),
    };
    installed.map_err(TelemetryError::Install)?;
    Ok(TelemetryHandle {
        filter: directives,
        format: config.log_format(),
    })
}

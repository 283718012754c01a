//! Concurrency and integrity guard for a shared JSON ledger.
//!
//! Several independent agents read and modify the same JSON documents. This
//! crate keeps those documents consistent through four cooperating parts:
//!
//! - [`lock`]: advisory file locks with a time-to-live, conflict reporting,
//!   and wait-for deadlock detection.
//! - [`recovery`]: timestamped backups, atomic writes, and a ladder of
//!   recovery strategies for corrupt documents.
//! - [`schema`]: declarative structural rules that classify violations and
//!   propose deterministic fixes.
//! - [`orchestrator`]: the fix pipeline that ties the other three together
//!   under a backup and a lock.
//!
//! Every component receives a [`LedgerContext`] at construction carrying the
//! lock directory, the clock, and the [`PipelineReporter`] that receives
//! lifecycle events. Nothing is read from process-wide state.
//!
//! ## Fix pipeline
//!
//! A mutating run follows a fixed order and stops at the first failure:
//!
//! 1. **Precheck**: the document exists, is readable, and is writable.
//! 2. **Backup**: a timestamped copy is written next to the document.
//! 3. **Lock**: the document's lock file is taken on behalf of the agent.
//! 4. **Recover, validate, fix, write**: corrupt documents are recovered
//!    first, fixes are filtered by the configured level, and the result is
//!    written atomically once.
//! 5. **Release**: the lock is released whether or not step 4 succeeded.
//!
//! Embedding applications that want the emitted `tracing` events on stderr
//! call [`telemetry::initialise`] once.

mod context;
pub mod lock;
pub mod orchestrator;
pub mod recovery;
mod reporter;
pub mod schema;
pub mod telemetry;

pub use context::{Clock, LedgerContext, SystemClock};
pub use reporter::{PipelineReporter, StructuredReporter};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(any(test, feature = "test-support"))]
pub use context::ManualClock;
#[cfg(any(test, feature = "test-support"))]
pub use reporter::{RecordingReporter, ReporterEvent};

pub use ledgerguard_config as config;

#[cfg(test)]
mod tests;

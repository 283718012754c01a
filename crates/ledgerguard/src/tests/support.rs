//! Shared fixtures for the behavioural suites.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use ledgerguard_config::Config;

use crate::context::{LedgerContext, ManualClock};
use crate::reporter::RecordingReporter;
use crate::schema::{CollectionRule, DefaultValue, FieldRule, Schema, ValueKind};

/// A temporary directory holding one ledger document and its lock directory.
pub struct Workspace {
    _dir: TempDir,
    pub document: PathBuf,
    pub lock_directory: PathBuf,
    pub clock: Arc<ManualClock>,
    pub reporter: Arc<RecordingReporter>,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        Self {
            document: dir.path().join("ledger.json"),
            lock_directory: dir.path().join(".locks"),
            clock: Arc::new(ManualClock::starting_now()),
            reporter: Arc::new(RecordingReporter::default()),
            _dir: dir,
        }
    }

    /// Context wired to the workspace clock and reporter.
    pub fn context(&self) -> LedgerContext {
        LedgerContext::new(&self.lock_directory)
            .with_clock(self.clock.clone())
            .with_reporter(self.reporter.clone())
    }

    /// Configuration with short retry intervals suitable for tests.
    pub fn config() -> Config {
        Config::default()
            .with_lock_retry_interval(Duration::from_millis(5))
            .with_max_retries(5)
            .with_owner_liveness_check(false)
            .with_agent_id("behaviour")
    }

    pub fn write(&self, contents: &str) {
        fs::write(&self.document, contents).expect("write document");
    }

    pub fn read(&self) -> Vec<u8> {
        fs::read(&self.document).expect("read document")
    }
}

/// Project ledger schema: a named project, a task list, and metadata.
pub fn ledger_schema() -> Schema {
    Schema::builder()
        .field(FieldRule::required("project", ValueKind::String))
        .field(
            FieldRule::required("tasks", ValueKind::Array)
                .with_default(DefaultValue::Static(json!([]))),
        )
        .field(
            FieldRule::required("metadata", ValueKind::Object)
                .with_default(DefaultValue::Static(json!({"version": 1}))),
        )
        .collection(CollectionRule::new("tasks").with_field(FieldRule::identifier("id", "task-")))
        .build()
}

/// Schema that only requires the project name and task list.
pub fn project_schema() -> Schema {
    Schema::builder()
        .field(FieldRule::required("project", ValueKind::String))
        .field(FieldRule::required("tasks", ValueKind::Array))
        .build()
}

#[rustfmt::skip]
pub fn strip_quotes(value: &str) -> &str { value.trim_matches('"') }

pub fn parse_millis(value: &str) -> Duration {
    Duration::from_millis(strip_quotes(value).parse().expect("millisecond count"))
}

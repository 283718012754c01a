//! Unit tests for components wired together through the crate root.

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;

use crate::config::Config;
use crate::lock::{LockError, LockManager};
use crate::orchestrator::Orchestrator;
use crate::{LedgerContext, ReporterEvent, telemetry};

use super::support::{Workspace, ledger_schema};

#[rstest]
fn context_from_config_uses_configured_lock_directory() {
    let config = Config::default().with_lock_directory("/var/run/ledger/.locks");

    let context = LedgerContext::from_config(&config);

    assert_eq!(
        context.lock_directory(),
        std::path::Path::new("/var/run/ledger/.locks")
    );
}

#[rstest]
fn orchestrators_sharing_a_manager_exclude_each_other() {
    let workspace = Workspace::new();
    workspace.write(r#"{"project":"p"}"#);
    let locks = Arc::new(
        LockManager::new(workspace.context(), &Workspace::config()).expect("lock manager"),
    );
    let first = Orchestrator::new(
        workspace.context(),
        &Workspace::config().with_agent_id("first"),
        ledger_schema(),
        Arc::clone(&locks),
    );
    let second = Orchestrator::new(
        workspace.context(),
        &Workspace::config().with_agent_id("second"),
        ledger_schema(),
        Arc::clone(&locks),
    );
    locks
        .acquire_lock(&workspace.document, first.agent_id(), Duration::from_secs(1))
        .expect("first agent locks");

    let error = second.auto_fix(&workspace.document).expect_err("second is locked out");

    assert_eq!(error.reason(), "file_lock_failed");
    locks
        .release_lock(&workspace.document, first.agent_id())
        .expect("first agent releases");
    let report = second.auto_fix(&workspace.document).expect("second runs");
    assert!(report.is_valid);
}

#[rstest]
fn pipeline_reports_lifecycle_in_order() {
    let workspace = Workspace::new();
    workspace.write(r#"{"project":"p"}"#);
    let orchestrator =
        Orchestrator::from_config(workspace.context(), &Workspace::config(), ledger_schema())
            .expect("orchestrator");

    let report = orchestrator.auto_fix(&workspace.document).expect("auto fix");

    let events = workspace.reporter.events();
    assert!(matches!(
        events.as_slice(),
        [
            ReporterEvent::BackupCreated(_),
            ReporterEvent::LockAcquired(acquired),
            ReporterEvent::LockReleased(released),
            ReporterEvent::SessionFinished(session),
        ] if acquired == "behaviour" && released == "behaviour" && *session == report.session_id
    ));
}

#[rstest]
fn releasing_an_unheld_lock_is_reported() {
    let workspace = Workspace::new();
    let locks = LockManager::new(workspace.context(), &Workspace::config()).expect("lock manager");

    let error = locks
        .release_lock(&workspace.document, "nobody")
        .expect_err("nothing to release");

    assert!(matches!(error, LockError::NotHeld { .. }));
}

#[rstest]
fn pipeline_runs_under_component_telemetry() {
    let workspace = Workspace::new();
    workspace.write(r#"{"project":"p","tasks":[]}"#);
    let config = Workspace::config().with_log_filter("warn,orchestrator=info,lock=debug");
    let handle = telemetry::initialise(&config).expect("telemetry");
    assert_eq!(handle, telemetry::initialise(&config).expect("telemetry again"));

    let orchestrator =
        Orchestrator::from_config(workspace.context(), &config, ledger_schema()).expect("orchestrator");
    let report = orchestrator.auto_fix(&workspace.document).expect("auto fix");

    assert!(report.is_valid);
    assert!(report.has_changes);
}

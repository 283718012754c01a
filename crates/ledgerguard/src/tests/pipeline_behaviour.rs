//! Behavioural tests for the fix pipeline.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use ledgerguard_config::AutoFixLevel;

use crate::orchestrator::{DryRunReport, FixSessionReport, Orchestrator, OrchestratorError};
use crate::recovery::BackupService;
use crate::schema::{FixKind, Schema};

use super::support::{Workspace, ledger_schema, project_schema, strip_quotes};

const VALID_LEDGER: &str = r#"{"project":"p","tasks":[],"metadata":{"version":1}}"#;

struct PipelineWorld {
    workspace: Workspace,
    schema: Option<Schema>,
    level: AutoFixLevel,
    backup: Option<PathBuf>,
    modified: Option<SystemTime>,
    report: Option<Result<FixSessionReport, OrchestratorError>>,
    dry_run: Option<DryRunReport>,
}

impl PipelineWorld {
    fn new() -> Self {
        Self {
            workspace: Workspace::new(),
            schema: None,
            level: AutoFixLevel::Moderate,
            backup: None,
            modified: None,
            report: None,
            dry_run: None,
        }
    }

    fn orchestrator(&mut self) -> Orchestrator {
        let schema = self.schema.take().unwrap_or_else(ledger_schema);
        let config = Workspace::config().with_auto_fix_level(self.level);
        Orchestrator::from_config(self.workspace.context(), &config, schema).expect("orchestrator")
    }

    fn modified(&self) -> SystemTime {
        fs::metadata(&self.workspace.document)
            .and_then(|metadata| metadata.modified())
            .expect("document mtime")
    }

    fn report(&self) -> &FixSessionReport {
        match self.report.as_ref().expect("auto-fix ran") {
            Ok(report) => report,
            Err(error) => panic!("auto-fix failed: {error}"),
        }
    }
}

#[fixture]
fn world() -> RefCell<PipelineWorld> {
    RefCell::new(PipelineWorld::new())
}

#[given("a ledger document missing its metadata")]
fn given_missing_metadata(world: &RefCell<PipelineWorld>) {
    world.borrow().workspace.write(r#"{"project":"p","tasks":[]}"#);
}

#[given("a ledger document with mistyped metadata")]
fn given_mistyped_metadata(world: &RefCell<PipelineWorld>) {
    world
        .borrow()
        .workspace
        .write(r#"{"project":"p","tasks":[],"metadata":"v1"}"#);
}

#[given("a valid ledger document")]
fn given_valid_document(world: &RefCell<PipelineWorld>) {
    let mut world = world.borrow_mut();
    world.workspace.write(VALID_LEDGER);
    let modified = world.modified();
    world.modified = Some(modified);
}

#[given("the auto-fix level is {level}")]
fn given_level(world: &RefCell<PipelineWorld>, level: String) {
    world.borrow_mut().level = strip_quotes(&level).parse().expect("auto-fix level");
}

#[given("the schema requires only a project and tasks")]
fn given_project_schema(world: &RefCell<PipelineWorld>) {
    world.borrow_mut().schema = Some(project_schema());
}

#[given("a backup of a valid ledger document")]
fn given_backup(world: &RefCell<PipelineWorld>) {
    let mut world = world.borrow_mut();
    world.workspace.write(r#"{"project":"p","tasks":[]}"#);
    let record = BackupService::new(world.workspace.context())
        .create_backup(&world.workspace.document)
        .expect("backup");
    world.backup = Some(record.backup_path);
}

#[given("the ledger document is corrupted")]
fn given_corrupted(world: &RefCell<PipelineWorld>) {
    world.borrow().workspace.write("{ invalid json");
}

#[when("auto-fix runs on the document")]
fn when_auto_fix(world: &RefCell<PipelineWorld>) {
    let mut world = world.borrow_mut();
    let orchestrator = world.orchestrator();
    let outcome = orchestrator.auto_fix(&world.workspace.document);
    world.report = Some(outcome);
}

#[when("a dry run inspects the document")]
fn when_dry_run(world: &RefCell<PipelineWorld>) {
    let mut world = world.borrow_mut();
    let orchestrator = world.orchestrator();
    let report = orchestrator.dry_run(&world.workspace.document).expect("dry run");
    world.dry_run = Some(report);
}

#[then("the fix {kind} was applied")]
fn then_fix_applied(world: &RefCell<PipelineWorld>, kind: String) {
    let expected: FixKind = strip_quotes(&kind).parse().expect("fix kind");
    let world = world.borrow();
    assert_eq!(world.report().fixes_applied, vec![expected]);
    assert!(world.report().has_changes);
}

#[then("no fixes were applied")]
fn then_no_fixes_applied(world: &RefCell<PipelineWorld>) {
    let world = world.borrow();
    assert!(world.report().fixes_applied.is_empty());
    assert!(!world.report().has_changes);
}

#[then("the document is valid")]
fn then_valid(world: &RefCell<PipelineWorld>) {
    assert!(world.borrow().report().is_valid);
}

#[then("the document is not valid")]
fn then_not_valid(world: &RefCell<PipelineWorld>) {
    assert!(!world.borrow().report().is_valid);
}

#[then("{count} error was fixed")]
fn then_errors_fixed(world: &RefCell<PipelineWorld>, count: String) {
    let expected: usize = strip_quotes(&count).parse().expect("count");
    assert_eq!(world.borrow().report().errors_fixed, expected);
}

#[then("the document lock was released")]
fn then_lock_released(world: &RefCell<PipelineWorld>) {
    let world = world.borrow();
    let entries = fs::read_dir(&world.workspace.lock_directory)
        .expect("lock directory")
        .count();
    assert_eq!(entries, 0);
}

#[then("the session log contains {entry}")]
fn then_session_log(world: &RefCell<PipelineWorld>, entry: String) {
    let entry = strip_quotes(&entry);
    let world = world.borrow();
    assert!(
        world.report().operations.iter().any(|line| line == entry),
        "operations: {:?}",
        world.report().operations
    );
}

#[then("the document matches the backup")]
fn then_matches_backup(world: &RefCell<PipelineWorld>) {
    let world = world.borrow();
    let backup = world.backup.as_ref().expect("backup taken");
    assert_eq!(world.workspace.read(), fs::read(backup).expect("read backup"));
}

#[then("no fixes are proposed")]
fn then_nothing_proposed(world: &RefCell<PipelineWorld>) {
    let world = world.borrow();
    let report = world.dry_run.as_ref().expect("dry run ran");
    assert!(!report.would_fix);
    assert!(report.proposed_fixes.is_empty());
    assert!(report.errors.is_empty());
    assert_eq!(report.recovery_needed, None);
}

#[then("the document was not modified")]
fn then_not_modified(world: &RefCell<PipelineWorld>) {
    let world = world.borrow();
    assert_eq!(Some(world.modified()), world.modified);
    assert_eq!(world.workspace.read(), VALID_LEDGER.as_bytes());
    assert!(world.workspace.reporter.events().is_empty());
}

#[scenario(path = "tests/features/fix_pipeline.feature")]
fn fix_pipeline_scenarios(#[from(world)] world: RefCell<PipelineWorld>) {
    drop(world);
}

//! Unit tests for backups, atomic writes and recovery.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::context::ManualClock;
use crate::reporter::{RecordingReporter, ReporterEvent};
use crate::schema::{DefaultValue, FieldRule, ValueKind};

struct Harness {
    dir: TempDir,
    document: PathBuf,
    clock: Arc<ManualClock>,
    reporter: Arc<RecordingReporter>,
    service: BackupService,
}

#[fixture]
fn harness() -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let document = dir.path().join("ledger.json");
    let clock = Arc::new(ManualClock::starting_now());
    let reporter = Arc::new(RecordingReporter::default());
    let context = LedgerContext::new(dir.path().join(".locks"))
        .with_clock(clock.clone())
        .with_reporter(reporter.clone());
    Harness {
        document,
        clock,
        reporter,
        service: BackupService::new(context),
        dir,
    }
}

fn schema_with_defaults() -> Schema {
    Schema::builder()
        .field(
            FieldRule::required("tasks", ValueKind::Array)
                .with_default(DefaultValue::Static(json!([]))),
        )
        .build()
}

fn schema_without_defaults() -> Schema {
    Schema::builder()
        .field(FieldRule::required("project", ValueKind::String))
        .build()
}

#[rstest]
fn backup_copies_current_bytes(harness: Harness) {
    fs::write(&harness.document, br#"{"project":"p"}"#).expect("write document");

    let record = harness.service.create_backup(&harness.document).expect("backup");

    assert_eq!(record.original_path, harness.document);
    assert_eq!(
        fs::read(&record.backup_path).expect("read backup"),
        br#"{"project":"p"}"#
    );
    let name = record
        .backup_path
        .file_name()
        .and_then(|name| name.to_str())
        .expect("utf-8 name");
    assert!(name.starts_with("ledger.json.backup."));
    assert!(!name.contains(':'));
    assert_eq!(
        harness.reporter.events(),
        vec![ReporterEvent::BackupCreated(record.backup_path.clone())]
    );
}

#[rstest]
fn backup_of_missing_file_fails(harness: Harness) {
    let error = harness
        .service
        .create_backup(&harness.document)
        .expect_err("missing source");
    assert!(matches!(error, RecoveryError::BackupFailed { .. }));
}

#[rstest]
fn same_instant_backups_get_distinct_names(harness: Harness) {
    fs::write(&harness.document, "{}").expect("write document");

    let first = harness.service.create_backup(&harness.document).expect("first");
    let second = harness.service.create_backup(&harness.document).expect("second");

    assert_ne!(first.backup_path, second.backup_path);
    assert!(second.timestamp > first.timestamp);
}

#[rstest]
fn backups_are_listed_newest_first_and_pruned(harness: Harness) {
    fs::write(&harness.document, "{}").expect("write document");
    fs::write(harness.dir.path().join("other.json.backup.x"), "{}").expect("write decoy");
    let mut created = Vec::new();
    for _ in 0..3 {
        created.push(harness.service.create_backup(&harness.document).expect("backup"));
        harness.clock.advance(Duration::from_secs(1));
    }

    let listed = harness
        .service
        .list_available_backups(&harness.document)
        .expect("list");
    let expected: Vec<_> = created.iter().rev().map(|r| r.backup_path.clone()).collect();
    assert_eq!(
        listed.iter().map(|r| r.backup_path.clone()).collect::<Vec<_>>(),
        expected
    );

    let removed = harness
        .service
        .prune_backups(&harness.document, 1)
        .expect("prune");
    assert_eq!(removed.len(), 2);
    let remaining = harness
        .service
        .list_available_backups(&harness.document)
        .expect("list after prune");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].backup_path, expected[0]);
}

#[rstest]
#[case::replace(false, "new")]
#[case::append(true, "oldnew")]
fn atomic_write_replaces_or_appends(
    harness: Harness,
    #[case] append: bool,
    #[case] expected: &str,
) {
    fs::write(&harness.document, "old").expect("write document");

    harness
        .service
        .atomic_write(&harness.document, b"new", append)
        .expect("write");

    assert_eq!(
        fs::read_to_string(&harness.document).expect("read"),
        expected
    );
    let leftovers = fs::read_dir(harness.dir.path()).expect("list").count();
    assert_eq!(leftovers, 1, "temporary files must not be left behind");
}

fn directory_entries(harness: &Harness) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(harness.dir.path())
        .expect("list directory")
        .map(|entry| {
            entry
                .expect("directory entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

#[rstest]
fn failed_staging_leaves_target_and_no_temporaries(harness: Harness) {
    fs::write(&harness.document, br#"{"project":"old"}"#).expect("write document");

    let error = stage_and_persist(&harness.document, true, |staged| {
        staged.write_all(br#"{"project":"#)?;
        Err(io::Error::other("writer killed"))
    })
    .expect_err("staging fails");

    assert_eq!(error.to_string(), "writer killed");
    assert_eq!(
        fs::read(&harness.document).expect("read document"),
        br#"{"project":"old"}"#
    );
    assert_eq!(directory_entries(&harness), vec!["ledger.json".to_string()]);
}

#[rstest]
fn crash_mid_write_leaves_old_content(harness: Harness) {
    fs::write(&harness.document, br#"{"project":"old"}"#).expect("write document");

    let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        stage_and_persist(&harness.document, true, |staged| {
            staged.write_all(br#"{"project":"ne"#)?;
            panic!("killed between write and rename");
        })
    }));

    assert!(crashed.is_err());
    assert_eq!(
        fs::read(&harness.document).expect("read document"),
        br#"{"project":"old"}"#
    );
    assert_eq!(directory_entries(&harness), vec!["ledger.json".to_string()]);

    harness
        .service
        .atomic_write(&harness.document, br#"{"project":"new"}"#, false)
        .expect("next write");
    assert_eq!(
        fs::read(&harness.document).expect("read document"),
        br#"{"project":"new"}"#
    );
}

#[rstest]
fn atomic_append_creates_missing_file(harness: Harness) {
    harness
        .service
        .atomic_write(&harness.document, b"{}", true)
        .expect("write");
    assert_eq!(fs::read(&harness.document).expect("read"), b"{}");
}

#[rstest]
fn newest_parseable_backup_is_restored_verbatim(harness: Harness) {
    fs::write(&harness.document, r#"{"project":"older","tasks":[]}"#).expect("write");
    harness.service.create_backup(&harness.document).expect("older backup");
    harness.clock.advance(Duration::from_secs(1));
    fs::write(&harness.document, "{\n  \"project\": \"latest\", \"tasks\": []\n}").expect("write");
    let latest = harness.service.create_backup(&harness.document).expect("latest backup");
    harness.clock.advance(Duration::from_secs(1));
    fs::write(&harness.document, "{ broken").expect("write");
    harness.service.create_backup(&harness.document).expect("corrupt backup");

    let recovery = harness
        .service
        .recover_corrupted_file(&harness.document, &schema_without_defaults())
        .expect("recover");

    assert_eq!(recovery.strategy, RecoveryStrategy::RestoreFromBackup);
    assert_eq!(recovery.restored_from, Some(latest.backup_path.clone()));
    assert_eq!(recovery.data["project"], json!("latest"));
    assert_eq!(
        fs::read(&harness.document).expect("read"),
        fs::read(&latest.backup_path).expect("read backup")
    );
    assert!(
        harness
            .reporter
            .events()
            .contains(&ReporterEvent::FileRecovered(RecoveryStrategy::RestoreFromBackup))
    );
}

#[rstest]
fn truncated_document_is_partially_repaired(harness: Harness) {
    fs::write(&harness.document, r#"{"project":"p","tasks":[{"id":"t1"},{"id":"#)
        .expect("write");

    let recovery = harness
        .service
        .recover_corrupted_file(&harness.document, &schema_without_defaults())
        .expect("recover");

    assert_eq!(recovery.strategy, RecoveryStrategy::PartialRepair);
    assert_eq!(recovery.data, json!({"project": "p", "tasks": [{"id": "t1"}]}));
    let written: Value =
        serde_json::from_slice(&fs::read(&harness.document).expect("read")).expect("parse");
    assert_eq!(written, recovery.data);
}

#[rstest]
fn hopeless_document_is_rebuilt_from_defaults(harness: Harness) {
    fs::write(&harness.document, "{ invalid json").expect("write");

    let recovery = harness
        .service
        .recover_corrupted_file(&harness.document, &schema_with_defaults())
        .expect("recover");

    assert_eq!(recovery.strategy, RecoveryStrategy::ReconstructMinimal);
    assert_eq!(recovery.data, json!({"tasks": []}));
}

#[rstest]
fn exhausted_ladder_reports_every_strategy(harness: Harness) {
    fs::write(&harness.document, "{ invalid json").expect("write");

    let error = harness
        .service
        .recover_corrupted_file(&harness.document, &schema_without_defaults())
        .expect_err("unrecoverable");

    match error {
        RecoveryError::Unrecoverable {
            strategies_attempted,
            ..
        } => assert_eq!(
            strategies_attempted,
            vec![
                RecoveryStrategy::RestoreFromBackup,
                RecoveryStrategy::PartialRepair,
                RecoveryStrategy::ReconstructMinimal,
            ]
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        fs::read_to_string(&harness.document).expect("read"),
        "{ invalid json"
    );
}

#[rstest]
fn planning_does_not_write(harness: Harness) {
    fs::write(&harness.document, r#"{"project":"p","#).expect("write");

    let recovery = harness
        .service
        .plan_recovery(&harness.document, &schema_without_defaults())
        .expect("plan");

    assert_eq!(recovery.strategy, RecoveryStrategy::PartialRepair);
    assert_eq!(
        fs::read_to_string(&harness.document).expect("read"),
        r#"{"project":"p","#
    );
    assert!(harness.reporter.events().is_empty());
}

/*!
 * Integration tests for the routing pipeline and service startup
 */

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::fs;
use std::sync::Arc;

use limbus_router::{
    AuditFormat, AuditLogger, RouteOutcome, RouteStats, RouterConfig, RouterService,
    RoutingConfig, RoutingPipeline,
};

fn routing_config(root: &TempDir) -> RoutingConfig {
    RouterConfig {
        inbox_dir: root.child("inbox").path().to_path_buf(),
        destination_root: root.child("dest").path().to_path_buf(),
        archive_dir: root.child("archive").path().to_path_buf(),
        settle_delay_ms: 0,
        ..Default::default()
    }
    .validate()
    .unwrap()
}

fn setup() -> (TempDir, RouterService) {
    let root = TempDir::new().unwrap();
    let service = RouterService::new(routing_config(&root));
    service.ensure_folders().unwrap();
    (root, service)
}

#[test]
fn test_file_is_copied_and_archived() {
    let (root, service) = setup();
    root.child("dest/P123").create_dir_all().unwrap();
    let inbox_file = root.child("inbox/limbus_site_P123.dcm");
    inbox_file.write_binary(b"DICM payload").unwrap();

    let outcome = service.pipeline().process(inbox_file.path());

    assert!(outcome.is_archived());
    assert_eq!(outcome.key(), Some("P123"));
    root.child("dest/P123/limbus_site_P123.dcm")
        .assert(predicate::path::is_file())
        .assert("DICM payload");
    root.child("archive/limbus_site_P123.dcm")
        .assert("DICM payload");
    inbox_file.assert(predicate::path::missing());
}

#[test]
fn test_nested_key_folder_is_not_a_destination() {
    let (root, service) = setup();
    root.child("dest/site-a/P9").create_dir_all().unwrap();
    let inbox_file = root.child("inbox/scan_P9.dcm");
    inbox_file.write_str("nine").unwrap();

    let outcome = service.pipeline().process(inbox_file.path());

    assert_eq!(
        outcome,
        RouteOutcome::NotFound {
            key: "P9".to_string()
        }
    );
    inbox_file.assert("nine");
    root.child("dest/site-a/P9/scan_P9.dcm")
        .assert(predicate::path::missing());
}

#[test]
fn test_second_archive_gets_timestamp_suffix() {
    let (root, service) = setup();
    root.child("dest/P1").create_dir_all().unwrap();
    let inbox_file = root.child("inbox/x_P1.dcm");

    inbox_file.write_str("first").unwrap();
    assert!(service.pipeline().process(inbox_file.path()).is_archived());

    inbox_file.write_str("second").unwrap();
    let outcome = service.pipeline().process(inbox_file.path());

    let RouteOutcome::Archived { archive_path, .. } = &outcome else {
        panic!("expected archived outcome, got {:?}", outcome);
    };
    let name = archive_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(
        predicate::str::is_match(r"^x_P1_\d{8}_\d{6}\.dcm$")
            .unwrap()
            .eval(name.as_str()),
        "unexpected archive name {}",
        name
    );
    root.child("archive/x_P1.dcm").assert("first");
    assert_eq!(fs::read_to_string(archive_path).unwrap(), "second");
    // Destination copy is overwritten by the newer file
    root.child("dest/P1/x_P1.dcm").assert("second");
}

#[test]
fn test_unroutable_and_unmatched_files_stay_in_inbox() {
    let (root, service) = setup();
    let no_key = root.child("inbox/nokey.dcm");
    no_key.write_str("a").unwrap();
    let no_folder = root.child("inbox/scan_P404.dcm");
    no_folder.write_str("b").unwrap();

    assert_eq!(service.pipeline().process(no_key.path()), RouteOutcome::Unroutable);
    assert_eq!(
        service.pipeline().process(no_folder.path()),
        RouteOutcome::NotFound {
            key: "P404".to_string()
        }
    );

    no_key.assert(predicate::path::exists());
    no_folder.assert(predicate::path::exists());
    root.child("archive/nokey.dcm").assert(predicate::path::missing());
}

#[test]
fn test_startup_scan_routes_existing_payloads_only() {
    let (root, service) = setup();
    root.child("dest/P1").create_dir_all().unwrap();
    root.child("dest/P2").create_dir_all().unwrap();
    root.child("inbox/a_P1.dcm").write_str("1").unwrap();
    root.child("inbox/b_P2.DCM").write_str("2").unwrap();
    root.child("inbox/c_P1.txt").write_str("not a payload").unwrap();

    let (_, scan) = service.startup().unwrap();

    assert_eq!(scan.files, 2);
    assert_eq!(scan.archived, 2);
    root.child("dest/P2/b_P2.DCM").assert("2");
    root.child("inbox/c_P1.txt").assert(predicate::path::exists());
}

#[test]
fn test_audit_log_records_each_outcome() {
    let root = TempDir::new().unwrap();
    let audit_path = root.child("audit.jsonl");
    let audit = Arc::new(AuditLogger::new(audit_path.path(), AuditFormat::Json).unwrap());
    let pipeline = RoutingPipeline::new(Arc::new(routing_config(&root))).with_audit(audit);
    root.child("inbox").create_dir_all().unwrap();
    root.child("archive").create_dir_all().unwrap();
    root.child("dest/P5").create_dir_all().unwrap();
    root.child("inbox/a_P5.dcm").write_str("5").unwrap();
    root.child("inbox/stray.dcm").write_str("?").unwrap();

    let summary = pipeline.startup_scan().unwrap();
    assert_eq!(summary.archived, 1);
    assert_eq!(summary.unroutable, 1);

    audit_path.assert(predicate::str::contains("\"status\":\"archived\""));
    let stats = RouteStats::from_audit_log(audit_path.path(), AuditFormat::Json).unwrap();
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.archived, 1);
    assert_eq!(stats.unroutable, 1);
}

/*!
 * Integration tests for archive retention and import cleanup
 */

use assert_fs::prelude::*;
use assert_fs::TempDir;
use filetime::{set_file_mtime, FileTime};
use predicates::prelude::*;
use std::time::{Duration, SystemTime};

use limbus_router::{ArchiveTimestamp, RetentionSweeper, RouterConfig, RouterService};

const DAY: u64 = 24 * 60 * 60;

fn age(path: &std::path::Path, days: u64) {
    let then = SystemTime::now() - Duration::from_secs(days * DAY);
    set_file_mtime(path, FileTime::from_system_time(then)).unwrap();
}

#[test]
fn test_archive_entries_past_retention_are_deleted() {
    let archive = TempDir::new().unwrap();
    let old = archive.child("old_P1.dcm");
    old.write_str("old").unwrap();
    let recent = archive.child("recent_P2.dcm");
    recent.write_str("recent").unwrap();
    age(old.path(), 40);
    age(recent.path(), 2);

    let report =
        RetentionSweeper::new().sweep_archive(archive.path(), 30, ArchiveTimestamp::Modified);

    assert_eq!(report.examined, 2);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 0);
    old.assert(predicate::path::missing());
    recent.assert(predicate::path::exists());
}

#[test]
fn test_import_cleanup_keeps_payloads_case_insensitively() {
    let import = TempDir::new().unwrap();
    import.child("a.dcm").write_str("a").unwrap();
    import.child("b.txt").write_str("b").unwrap();
    import.child("c.DCM").write_str("c").unwrap();
    import.child("d").write_str("no extension").unwrap();

    let report = RetentionSweeper::new().sweep_import(import.path(), "dcm");

    assert_eq!(report.deleted, 2);
    import.child("a.dcm").assert(predicate::path::exists());
    import.child("c.DCM").assert(predicate::path::exists());
    import.child("b.txt").assert(predicate::path::missing());
    import.child("d").assert(predicate::path::missing());
}

#[test]
fn test_disabled_sweeps_leave_folders_alone() {
    let root = TempDir::new().unwrap();
    let config = RouterConfig {
        inbox_dir: root.child("inbox").path().to_path_buf(),
        destination_root: root.child("dest").path().to_path_buf(),
        archive_dir: root.child("archive").path().to_path_buf(),
        import_dir: Some(root.child("import").path().to_path_buf()),
        archive_cleanup: false,
        import_cleanup: false,
        ..Default::default()
    }
    .validate()
    .unwrap();
    let service = RouterService::new(config);
    service.ensure_folders().unwrap();

    let ancient = root.child("archive/ancient_P1.dcm");
    ancient.write_str("x").unwrap();
    age(ancient.path(), 400);
    root.child("import/notes.txt").write_str("keep").unwrap();

    let summary = service.run_sweeps();

    assert!(summary.archive.is_none());
    assert!(summary.import.is_none());
    ancient.assert(predicate::path::exists());
    root.child("import/notes.txt").assert(predicate::path::exists());
}

#[test]
fn test_service_sweeps_from_configuration() {
    let root = TempDir::new().unwrap();
    let config = RouterConfig {
        inbox_dir: root.child("inbox").path().to_path_buf(),
        destination_root: root.child("dest").path().to_path_buf(),
        archive_dir: root.child("archive").path().to_path_buf(),
        import_dir: Some(root.child("import").path().to_path_buf()),
        archive_retention_days: 7,
        archive_timestamp: ArchiveTimestamp::Modified,
        import_cleanup: true,
        ..Default::default()
    }
    .validate()
    .unwrap();
    let service = RouterService::new(config);
    service.ensure_folders().unwrap();

    let stale = root.child("archive/stale_P1.dcm");
    stale.write_str("x").unwrap();
    age(stale.path(), 8);
    root.child("import/manifest.xml").write_str("<x/>").unwrap();
    root.child("import/image.dcm").write_str("keep").unwrap();

    let summary = service.run_sweeps();

    assert_eq!(summary.deleted(), 2);
    assert_eq!(summary.failed(), 0);
    stale.assert(predicate::path::missing());
    root.child("import/image.dcm").assert("keep");
}

#[test]
fn test_zero_retention_clears_the_archive() {
    let root = TempDir::new().unwrap();
    let config = RouterConfig {
        inbox_dir: root.child("inbox").path().to_path_buf(),
        destination_root: root.child("dest").path().to_path_buf(),
        archive_dir: root.child("archive").path().to_path_buf(),
        archive_retention_days: 0,
        archive_timestamp: ArchiveTimestamp::Modified,
        ..Default::default()
    }
    .validate()
    .unwrap();
    let service = RouterService::new(config);
    service.ensure_folders().unwrap();

    let epoch = root.child("archive/epoch_P1.dcm");
    epoch.write_str("x").unwrap();
    set_file_mtime(epoch.path(), FileTime::from_unix_time(0, 0)).unwrap();
    let yesterday = root.child("archive/yesterday_P2.dcm");
    yesterday.write_str("y").unwrap();
    age(yesterday.path(), 1);

    let summary = service.run_sweeps();

    assert_eq!(summary.archive.map(|r| r.deleted), Some(2));
    epoch.assert(predicate::path::missing());
    yesterday.assert(predicate::path::missing());
}

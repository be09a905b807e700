/*!
 * Routing pipeline: one file from inbox to destination and archive
 *
 * Detected -> key extracted -> destination resolved -> copied -> archived.
 * Every step that can end the pass early yields a [`RouteOutcome`]; nothing
 * here returns an error, so one bad file never stops the files after it.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use super::archive::archive_file;
use super::resolver::resolve_destination;
use crate::audit::{AuditLogger, RouteEvent};
use crate::config::RoutingConfig;
use crate::error::Result;

/// Terminal state of one pipeline pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// File name did not yield a routing key
    Unroutable,

    /// No destination folder exists for the key
    NotFound { key: String },

    /// Copy to the destination failed; the original is still in the inbox
    CopyFailed {
        key: String,
        destination: PathBuf,
        error: String,
    },

    /// Copied, but the original could not be moved to the archive
    ArchiveFailed {
        key: String,
        destination: PathBuf,
        error: String,
    },

    /// Copied and archived
    Archived {
        key: String,
        destination: PathBuf,
        archive_path: PathBuf,
    },
}

impl RouteOutcome {
    /// Short status label used in logs and the audit trail
    pub fn status(&self) -> &'static str {
        match self {
            RouteOutcome::Unroutable => "unroutable",
            RouteOutcome::NotFound { .. } => "not_found",
            RouteOutcome::CopyFailed { .. } => "copy_failed",
            RouteOutcome::ArchiveFailed { .. } => "archive_failed",
            RouteOutcome::Archived { .. } => "archived",
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            RouteOutcome::Unroutable => None,
            RouteOutcome::NotFound { key }
            | RouteOutcome::CopyFailed { key, .. }
            | RouteOutcome::ArchiveFailed { key, .. }
            | RouteOutcome::Archived { key, .. } => Some(key),
        }
    }

    pub fn destination(&self) -> Option<&Path> {
        match self {
            RouteOutcome::Unroutable | RouteOutcome::NotFound { .. } => None,
            RouteOutcome::CopyFailed { destination, .. }
            | RouteOutcome::ArchiveFailed { destination, .. }
            | RouteOutcome::Archived { destination, .. } => Some(destination),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RouteOutcome::CopyFailed { error, .. } | RouteOutcome::ArchiveFailed { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }

    pub fn is_archived(&self) -> bool {
        matches!(self, RouteOutcome::Archived { .. })
    }

    /// I/O failures, as opposed to files that were legitimately skipped
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RouteOutcome::CopyFailed { .. } | RouteOutcome::ArchiveFailed { .. }
        )
    }
}

/// A file moving through one pipeline pass
#[derive(Debug, Clone)]
pub struct RoutedFile {
    pub source: PathBuf,
    pub key: Option<String>,
    pub destination: Option<PathBuf>,
}

impl RoutedFile {
    pub fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            key: None,
            destination: None,
        }
    }

    /// File name as text, for matching and logging
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Outcome counts for a batch of passes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub files: usize,
    pub archived: usize,
    pub unroutable: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl ScanSummary {
    pub fn record(&mut self, outcome: &RouteOutcome) {
        self.files += 1;
        match outcome {
            RouteOutcome::Archived { .. } => self.archived += 1,
            RouteOutcome::Unroutable => self.unroutable += 1,
            RouteOutcome::NotFound { .. } => self.not_found += 1,
            RouteOutcome::CopyFailed { .. } | RouteOutcome::ArchiveFailed { .. } => {
                self.failed += 1
            }
        }
    }
}

/// Routes single files according to an immutable configuration
#[derive(Clone)]
pub struct RoutingPipeline {
    config: Arc<RoutingConfig>,
    audit: Option<Arc<AuditLogger>>,
}

impl RoutingPipeline {
    pub fn new(config: Arc<RoutingConfig>) -> Self {
        Self {
            config,
            audit: None,
        }
    }

    /// Record every terminal outcome in `audit`
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Handle a watch notification: wait for the writer to settle, then route.
    ///
    /// Returns `None` when the file is gone by then (already routed on an
    /// earlier notification, or removed by its producer).
    pub fn process_notified(&self, source: &Path) -> Option<RouteOutcome> {
        if !self.config.settle_delay.is_zero() {
            thread::sleep(self.config.settle_delay);
        }

        if !source.is_file() {
            debug!(file = %source.display(), "notified file no longer in inbox, skipping");
            return None;
        }
        Some(self.process(source))
    }

    /// Run one full pass for `source`
    pub fn process(&self, source: &Path) -> RouteOutcome {
        let mut routed = RoutedFile::new(source);
        let outcome = self.route(&mut routed);

        if let Some(ref audit) = self.audit {
            if let Err(e) = audit.emit(&RouteEvent::from_outcome(source, &outcome)) {
                warn!(file = %source.display(), "audit record not written: {}", e);
            }
        }
        outcome
    }

    fn route(&self, routed: &mut RoutedFile) -> RouteOutcome {
        let file_name = routed.file_name();
        info!(file = %file_name, "file detected");

        let Some(key) = self.config.pattern.extract_key(&file_name) else {
            warn!(
                file = %file_name,
                pattern = self.config.pattern.as_str(),
                "no routing key in file name, leaving file in inbox"
            );
            return RouteOutcome::Unroutable;
        };
        debug!(file = %file_name, key = %key, "routing key extracted");
        routed.key = Some(key.clone());

        let Some(destination) = resolve_destination(&key, &self.config.destination_root) else {
            warn!(
                file = %file_name,
                key = %key,
                attempted = %self.config.destination_root.join(&key).display(),
                "no destination folder for key, leaving file in inbox"
            );
            return RouteOutcome::NotFound { key };
        };
        debug!(
            file = %file_name,
            key = %key,
            destination = %destination.display(),
            "destination resolved"
        );
        routed.destination = Some(destination.clone());

        let target = destination.join(routed.source.file_name().unwrap_or_default());
        if let Err(e) = fs::copy(&routed.source, &target) {
            error!(
                file = %file_name,
                key = %key,
                destination = %target.display(),
                "copy failed, file stays in inbox: {}", e
            );
            return RouteOutcome::CopyFailed {
                key,
                destination,
                error: e.to_string(),
            };
        }
        info!(file = %file_name, key = %key, destination = %target.display(), "copied");

        match archive_file(&routed.source, &self.config.archive_dir) {
            Ok(archive_path) => {
                info!(
                    file = %file_name,
                    key = %key,
                    archive = %archive_path.display(),
                    "archived"
                );
                RouteOutcome::Archived {
                    key,
                    destination,
                    archive_path,
                }
            }
            Err(e) => {
                error!(
                    file = %file_name,
                    key = %key,
                    destination = %target.display(),
                    archive = %self.config.archive_dir.display(),
                    "archive failed after copy: {}", e
                );
                RouteOutcome::ArchiveFailed {
                    key,
                    destination,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Route every payload file already sitting in the inbox, in name order.
    ///
    /// Only fails when the inbox itself cannot be listed.
    pub fn startup_scan(&self) -> Result<ScanSummary> {
        let mut pending: Vec<PathBuf> = fs::read_dir(&self.config.inbox_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.config.is_payload(path))
            .collect();
        pending.sort();

        info!(
            inbox = %self.config.inbox_dir.display(),
            files = pending.len(),
            "startup scan"
        );

        let mut summary = ScanSummary::default();
        for path in pending {
            let outcome = self.process(&path);
            summary.record(&outcome);
        }

        info!(
            archived = summary.archived,
            unroutable = summary.unroutable,
            not_found = summary.not_found,
            failed = summary.failed,
            "startup scan finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        inbox: PathBuf,
        dest: PathBuf,
        archive: PathBuf,
        pipeline: RoutingPipeline,
    }

    fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let inbox = root.path().join("inbox");
        let dest = root.path().join("dest");
        let archive = root.path().join("archive");
        fs::create_dir_all(&inbox).unwrap();
        fs::create_dir_all(&dest).unwrap();

        let config = RouterConfig {
            inbox_dir: inbox.clone(),
            destination_root: dest.clone(),
            archive_dir: archive.clone(),
            settle_delay_ms: 0,
            ..Default::default()
        }
        .validate()
        .unwrap();

        Fixture {
            _root: root,
            inbox,
            dest,
            archive,
            pipeline: RoutingPipeline::new(Arc::new(config)),
        }
    }

    #[test]
    fn test_routes_copies_and_archives() {
        let f = fixture();
        fs::create_dir(f.dest.join("P123")).unwrap();
        let source = f.inbox.join("limbus_site_P123.dcm");
        fs::write(&source, b"DICM-bytes").unwrap();

        let outcome = f.pipeline.process(&source);

        assert_eq!(
            outcome,
            RouteOutcome::Archived {
                key: "P123".to_string(),
                destination: f.dest.join("P123"),
                archive_path: f.archive.join("limbus_site_P123.dcm"),
            }
        );
        assert_eq!(
            fs::read(f.dest.join("P123/limbus_site_P123.dcm")).unwrap(),
            b"DICM-bytes"
        );
        assert_eq!(
            fs::read(f.archive.join("limbus_site_P123.dcm")).unwrap(),
            b"DICM-bytes"
        );
        assert!(!source.exists());
    }

    #[test]
    fn test_unroutable_file_is_left_alone() {
        let f = fixture();
        let source = f.inbox.join("nokey.dcm");
        fs::write(&source, b"x").unwrap();

        let outcome = f.pipeline.process(&source);

        assert_eq!(outcome, RouteOutcome::Unroutable);
        assert!(source.exists());
        assert!(!f.archive.exists());
    }

    #[test]
    fn test_missing_destination_is_not_found() {
        let f = fixture();
        let source = f.inbox.join("a_P404.dcm");
        fs::write(&source, b"x").unwrap();

        let outcome = f.pipeline.process(&source);

        assert_eq!(
            outcome,
            RouteOutcome::NotFound {
                key: "P404".to_string()
            }
        );
        assert!(source.exists());
    }

    #[test]
    fn test_destination_copy_overwrites() {
        let f = fixture();
        fs::create_dir(f.dest.join("P1")).unwrap();
        fs::write(f.dest.join("P1/study_P1.dcm"), b"old export").unwrap();
        let source = f.inbox.join("study_P1.dcm");
        fs::write(&source, b"new export").unwrap();

        assert!(f.pipeline.process(&source).is_archived());
        assert_eq!(
            fs::read(f.dest.join("P1/study_P1.dcm")).unwrap(),
            b"new export"
        );
    }

    #[test]
    fn test_copy_failure_keeps_original() {
        let f = fixture();
        fs::create_dir(f.dest.join("P2")).unwrap();
        // A directory at the target name makes the copy fail
        fs::create_dir(f.dest.join("P2/scan_P2.dcm")).unwrap();
        let source = f.inbox.join("scan_P2.dcm");
        fs::write(&source, b"x").unwrap();

        let outcome = f.pipeline.process(&source);

        assert_eq!(outcome.status(), "copy_failed");
        assert!(outcome.is_failure());
        assert!(source.exists());
        assert!(!f.archive.join("scan_P2.dcm").exists());
    }

    #[test]
    fn test_notified_file_that_vanished_is_skipped() {
        let f = fixture();
        let outcome = f.pipeline.process_notified(&f.inbox.join("gone_P1.dcm"));
        assert_eq!(outcome, None);
    }

    #[test]
    fn test_startup_scan_routes_payload_files_only() {
        let f = fixture();
        fs::create_dir(f.dest.join("P1")).unwrap();
        fs::write(f.inbox.join("a_P1.dcm"), b"1").unwrap();
        fs::write(f.inbox.join("b_P1.DCM"), b"2").unwrap();
        fs::write(f.inbox.join("c_P9.dcm"), b"3").unwrap();
        fs::write(f.inbox.join("notes.txt"), b"4").unwrap();

        let summary = f.pipeline.startup_scan().unwrap();

        assert_eq!(
            summary,
            ScanSummary {
                files: 3,
                archived: 2,
                unroutable: 0,
                not_found: 1,
                failed: 0,
            }
        );
        assert!(f.inbox.join("c_P9.dcm").exists());
        assert!(f.inbox.join("notes.txt").exists());
        assert!(f.dest.join("P1/b_P1.DCM").exists());
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = RouteOutcome::ArchiveFailed {
            key: "K".to_string(),
            destination: PathBuf::from("/d/K"),
            error: "denied".to_string(),
        };
        assert_eq!(outcome.key(), Some("K"));
        assert_eq!(outcome.destination(), Some(Path::new("/d/K")));
        assert_eq!(outcome.error(), Some("denied"));
        assert_eq!(RouteOutcome::Unroutable.key(), None);
        assert_eq!(
            RouteOutcome::NotFound { key: "K".into() }.destination(),
            None
        );
    }
}

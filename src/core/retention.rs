/*!
 * Retention sweeps over the archive and import folders
 *
 * Both sweeps look only at regular files directly inside the folder and are
 * best-effort: a file that cannot be inspected or deleted is logged and
 * counted, and the sweep moves on.
 */

use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{has_extension, ArchiveTimestamp, RoutingConfig};

/// Outcome of one sweep over one folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub folder: PathBuf,
    pub examined: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Another sweep of the same folder was already running
    pub skipped: bool,
}

impl SweepReport {
    fn new(folder: &Path) -> Self {
        Self {
            folder: folder.to_path_buf(),
            ..Default::default()
        }
    }
}

/// Reports for one pass of both sweeps
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    /// `None` when archive cleanup is disabled
    pub archive: Option<SweepReport>,
    /// `None` when import cleanup is disabled or no import folder is set
    pub import: Option<SweepReport>,
}

impl SweepSummary {
    pub fn deleted(&self) -> usize {
        self.archive.as_ref().map_or(0, |r| r.deleted) + self.import.as_ref().map_or(0, |r| r.deleted)
    }

    pub fn failed(&self) -> usize {
        self.archive.as_ref().map_or(0, |r| r.failed) + self.import.as_ref().map_or(0, |r| r.failed)
    }
}

/// Runs retention sweeps, allowing at most one sweep per folder at a time
#[derive(Debug, Default)]
pub struct RetentionSweeper {
    active: Mutex<HashSet<PathBuf>>,
}

impl RetentionSweeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every sweep the configuration enables
    pub fn sweep_all(&self, config: &RoutingConfig) -> SweepSummary {
        let archive = config.archive_cleanup.then(|| {
            self.sweep_archive(
                &config.archive_dir,
                config.archive_retention_days,
                config.archive_timestamp,
            )
        });

        let import = match (&config.import_dir, config.import_cleanup) {
            (Some(import_dir), true) => {
                Some(self.sweep_import(import_dir, &config.payload_extension))
            }
            _ => None,
        };

        SweepSummary { archive, import }
    }

    /// Delete archive entries older than `retention_days`
    pub fn sweep_archive(
        &self,
        archive_dir: &Path,
        retention_days: u64,
        timestamp: ArchiveTimestamp,
    ) -> SweepReport {
        self.sweep_archive_at(archive_dir, retention_days, timestamp, Utc::now())
    }

    /// Same as [`sweep_archive`](Self::sweep_archive) against an explicit clock
    pub fn sweep_archive_at(
        &self,
        archive_dir: &Path,
        retention_days: u64,
        timestamp: ArchiveTimestamp,
        now: DateTime<Utc>,
    ) -> SweepReport {
        // A cutoff before the representable range means nothing has expired yet
        let cutoff = i64::try_from(retention_days)
            .ok()
            .and_then(TimeDelta::try_days)
            .and_then(|retention| now.checked_sub_signed(retention));

        let report = self.exclusive(archive_dir, |report| {
            let Some(cutoff) = cutoff else {
                warn!(
                    retention_days,
                    "retention reaches past the supported date range, nothing expires"
                );
                return;
            };
            for (path, metadata) in top_level_files(archive_dir, report) {
                let Some(stamp) = entry_time(&metadata, timestamp) else {
                    warn!(file = %path.display(), "no usable timestamp, keeping archive entry");
                    continue;
                };

                if DateTime::<Utc>::from(stamp) < cutoff {
                    remove(&path, report);
                }
            }
        });

        info!(
            folder = %archive_dir.display(),
            retention_days,
            examined = report.examined,
            deleted = report.deleted,
            failed = report.failed,
            "archive sweep finished"
        );
        report
    }

    /// Delete every file in the import folder that is not a payload file
    pub fn sweep_import(&self, import_dir: &Path, payload_extension: &str) -> SweepReport {
        let report = self.exclusive(import_dir, |report| {
            for (path, _) in top_level_files(import_dir, report) {
                if !has_extension(&path, payload_extension) {
                    remove(&path, report);
                }
            }
        });

        info!(
            folder = %import_dir.display(),
            examined = report.examined,
            deleted = report.deleted,
            failed = report.failed,
            "import sweep finished"
        );
        report
    }

    fn exclusive<F>(&self, folder: &Path, sweep: F) -> SweepReport
    where
        F: FnOnce(&mut SweepReport),
    {
        let mut report = SweepReport::new(folder);

        let claimed = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(folder.to_path_buf());
        if !claimed {
            warn!(folder = %folder.display(), "sweep already running for folder, skipping");
            report.skipped = true;
            return report;
        }

        sweep(&mut report);

        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(folder);
        report
    }
}

/// Regular files directly inside `dir`; a missing folder yields nothing
fn top_level_files(dir: &Path, report: &mut SweepReport) -> Vec<(PathBuf, Metadata)> {
    if !dir.is_dir() {
        debug!(folder = %dir.display(), "sweep folder does not exist");
        return Vec::new();
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(folder = %dir.display(), "cannot read folder entry: {}", e);
                report.failed += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        report.examined += 1;
        match entry.metadata() {
            Ok(metadata) => files.push((entry.into_path(), metadata)),
            Err(e) => {
                warn!(file = %entry.path().display(), "cannot stat entry: {}", e);
                report.failed += 1;
            }
        }
    }
    files
}

fn entry_time(metadata: &Metadata, timestamp: ArchiveTimestamp) -> Option<SystemTime> {
    match timestamp {
        ArchiveTimestamp::Created => metadata.created().or_else(|_| metadata.modified()).ok(),
        ArchiveTimestamp::Modified => metadata.modified().ok(),
    }
}

fn remove(path: &Path, report: &mut SweepReport) {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(file = %path.display(), "deleted");
            report.deleted += 1;
        }
        Err(e) => {
            error!(file = %path.display(), "failed to delete: {}", e);
            report.failed += 1;
        }
    }
}

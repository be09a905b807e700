/*!
 * Routing statistics from audit logs
 */

use std::path::Path;

use crate::audit::{read_audit_log, RouteEvent};
use crate::config::AuditFormat;
use crate::error::Result;

/// Counts over every record in an audit log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteStats {
    pub total_files: usize,
    pub archived: usize,
    pub unroutable: usize,
    pub not_found: usize,
    pub copy_failed: usize,
    pub archive_failed: usize,
    pub sweeps: usize,
    pub swept_entries: u64,
    /// Most recent routing record
    pub most_recent: Option<RouteEvent>,
}

impl RouteStats {
    /// Calculate statistics from audit log
    pub fn from_audit_log(log_path: &Path, format: AuditFormat) -> Result<Self> {
        let events = read_audit_log(log_path, format)?;
        Ok(Self::from_events(&events))
    }

    pub fn from_events(events: &[RouteEvent]) -> Self {
        let mut stats = Self::default();

        for event in events {
            if event.action == "sweep" {
                stats.sweeps += 1;
                stats.swept_entries += event.deleted.unwrap_or(0);
                continue;
            }

            stats.total_files += 1;
            match event.status.as_str() {
                "archived" => stats.archived += 1,
                "unroutable" => stats.unroutable += 1,
                "not_found" => stats.not_found += 1,
                "copy_failed" => stats.copy_failed += 1,
                "archive_failed" => stats.archive_failed += 1,
                _ => {}
            }
            stats.most_recent = Some(event.clone());
        }
        stats
    }

    /// Files that hit an I/O failure
    pub fn failed(&self) -> usize {
        self.copy_failed + self.archive_failed
    }

    /// Print formatted statistics
    pub fn print(&self) {
        println!("Limbus Routing Statistics");
        println!("=========================\n");

        println!("Files processed: {}", self.total_files);
        println!("  Archived:       {}", self.archived);
        println!("  Unroutable:     {}", self.unroutable);
        println!("  No destination: {}", self.not_found);
        println!("  Copy failed:    {}", self.copy_failed);
        println!("  Archive failed: {}\n", self.archive_failed);

        if self.total_files > 0 {
            let pct = self.archived as f64 / self.total_files as f64 * 100.0;
            println!("Routed successfully: {:.1}%\n", pct);
        }

        println!("Retention sweeps: {}", self.sweeps);
        println!("  Entries removed: {}\n", self.swept_entries);

        if let Some(ref recent) = self.most_recent {
            println!("Most recent file:");
            println!("  {}", recent.timestamp);
            println!("  {} ({})", recent.file, recent.status);
            if let Some(ref destination) = recent.destination {
                println!("  -> {}", destination);
            }
            if let Some(ref error) = recent.error {
                println!("  error: {}", error);
            }
        }
    }
}

/*!
 * Audit logging for routing decisions
 *
 * One record per terminal pipeline outcome and one per retention sweep,
 * written as JSON Lines or CSV for after-the-fact reconstruction of what
 * happened to a file without inspecting the folders.
 *
 * # Example
 *
 * ```no_run
 * use limbus_router::audit::{AuditLogger, RouteEvent};
 * use limbus_router::config::AuditFormat;
 * use std::path::Path;
 *
 * let logger = AuditLogger::new(Path::new("routing_audit.log"), AuditFormat::Json).unwrap();
 * let event = RouteEvent::new("route", Path::new("/inbox/a_P1.dcm"), "unroutable");
 * logger.emit(&event).unwrap();
 * ```
 */

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::AuditFormat;
use crate::core::pipeline::RouteOutcome;
use crate::core::retention::SweepReport;
use crate::error::{Result, RouterError};

const CSV_HEADER: &str = "timestamp,action,file,key,destination,archive_path,status,error,deleted";

/// A single audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEvent {
    /// RFC 3339 timestamp
    pub timestamp: String,

    /// "route" or "sweep"
    pub action: String,

    /// Routed file, or swept folder
    pub file: String,

    /// Extracted routing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Resolved destination folder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Final archive path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<String>,

    /// archived, unroutable, not_found, copy_failed, archive_failed, swept
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Entries deleted by a sweep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u64>,
}

impl RouteEvent {
    /// Create a new audit event with required fields
    pub fn new(action: &str, file: &Path, status: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            action: action.to_string(),
            file: file.to_string_lossy().to_string(),
            key: None,
            destination: None,
            archive_path: None,
            status: status.to_string(),
            error: None,
            deleted: None,
        }
    }

    /// Build the record for a finished pipeline pass
    pub fn from_outcome(file: &Path, outcome: &RouteOutcome) -> Self {
        let mut event = Self::new("route", file, outcome.status());
        event.key = outcome.key().map(str::to_string);
        event.destination = outcome
            .destination()
            .map(|p| p.to_string_lossy().to_string());
        if let RouteOutcome::Archived { archive_path, .. } = outcome {
            event.archive_path = Some(archive_path.to_string_lossy().to_string());
        }
        event.error = outcome.error().map(str::to_string);
        event
    }

    /// Build the record for a finished sweep
    pub fn from_sweep(report: &SweepReport) -> Self {
        let status = if report.skipped { "skipped" } else { "swept" };
        let mut event = Self::new("sweep", &report.folder, status);
        event.deleted = Some(report.deleted as u64);
        if report.failed > 0 {
            event.error = Some(format!("{} entries could not be removed", report.failed));
        }
        event
    }
}

/// Append-only audit logger, safe to share between threads
pub struct AuditLogger {
    path: PathBuf,
    format: AuditFormat,
    writer: Mutex<AuditWriter>,
}

struct AuditWriter {
    out: BufWriter<File>,
    csv_header_written: bool,
}

impl AuditLogger {
    /// Open or create the log file in append mode
    pub fn new(path: &Path, format: AuditFormat) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RouterError::AuditLog(format!("Failed to create audit log directory: {}", e))
                })?;
            }
        }

        // An existing non-empty CSV log already carries its header
        let has_content = std::fs::metadata(path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| RouterError::AuditLog(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            format,
            writer: Mutex::new(AuditWriter {
                out: BufWriter::new(file),
                csv_header_written: has_content,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AuditFormat {
        self.format
    }

    /// Append one event and flush
    pub fn emit(&self, event: &RouteEvent) -> Result<()> {
        let mut writer = self.lock()?;
        match self.format {
            AuditFormat::Json => {
                let json = serde_json::to_string(event).map_err(|e| {
                    RouterError::AuditLog(format!("Failed to serialize event: {}", e))
                })?;
                writeln!(writer.out, "{}", json)
                    .map_err(|e| RouterError::AuditLog(format!("Failed to write audit log: {}", e)))?;
            }
            AuditFormat::Csv => {
                if !writer.csv_header_written {
                    writeln!(writer.out, "{}", CSV_HEADER).map_err(|e| {
                        RouterError::AuditLog(format!("Failed to write CSV header: {}", e))
                    })?;
                    writer.csv_header_written = true;
                }
                writeln!(writer.out, "{}", to_csv_line(event)).map_err(|e| {
                    RouterError::AuditLog(format!("Failed to write CSV entry: {}", e))
                })?;
            }
        }

        writer
            .out
            .flush()
            .map_err(|e| RouterError::AuditLog(format!("Failed to flush audit log: {}", e)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, AuditWriter>> {
        self.writer
            .lock()
            .map_err(|_| RouterError::AuditLog("audit log writer poisoned".to_string()))
    }
}

/// Quote a CSV field; line breaks become spaces so every record stays on one line
fn escape_csv(s: &str) -> String {
    let s = s.replace(['\r', '\n'], " ");
    if s.contains(',') || s.contains('"') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s
    }
}

fn to_csv_line(event: &RouteEvent) -> String {
    let optional = |value: &Option<String>| value.as_deref().map(escape_csv).unwrap_or_default();
    format!(
        "{},{},{},{},{},{},{},{},{}",
        escape_csv(&event.timestamp),
        escape_csv(&event.action),
        escape_csv(&event.file),
        optional(&event.key),
        optional(&event.destination),
        optional(&event.archive_path),
        escape_csv(&event.status),
        optional(&event.error),
        event.deleted.map(|d| d.to_string()).unwrap_or_default(),
    )
}

/// Split one CSV line, honouring double-quoted fields
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_csv_line(line: &str) -> Option<RouteEvent> {
    let fields = split_csv_line(line);
    if fields.len() != 9 {
        return None;
    }

    let optional = |s: &str| (!s.is_empty()).then(|| s.to_string());
    Some(RouteEvent {
        timestamp: fields[0].clone(),
        action: fields[1].clone(),
        file: fields[2].clone(),
        key: optional(&fields[3]),
        destination: optional(&fields[4]),
        archive_path: optional(&fields[5]),
        status: fields[6].clone(),
        error: optional(&fields[7]),
        deleted: fields[8].parse().ok(),
    })
}

/// Read audit log entries; unparsable lines are skipped
pub fn read_audit_log(log_path: &Path, format: AuditFormat) -> Result<Vec<RouteEvent>> {
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(log_path)
        .map_err(|e| RouterError::AuditLog(format!("Failed to read audit log: {}", e)))?;

    let events = match format {
        AuditFormat::Json => content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect(),
        AuditFormat::Csv => content
            .lines()
            .filter(|line| *line != CSV_HEADER)
            .filter_map(parse_csv_line)
            .collect(),
    };
    Ok(events)
}

/*!
 * Configuration types for the inbox router
 *
 * [`RouterConfig`] is the on-disk TOML record. [`RouterConfig::validate`]
 * turns it into the immutable [`RoutingConfig`] the routing core runs on.
 */

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::matcher::{RoutingPattern, DEFAULT_ROUTING_PATTERN};
use crate::error::{Result, RouterError};

/// Configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Watched folder where new files appear
    pub inbox_dir: PathBuf,

    /// Folder whose immediate subfolders are named by routing key
    pub destination_root: PathBuf,

    /// Folder receiving originals after routing
    pub archive_dir: PathBuf,

    /// Companion folder purged of non-payload files
    #[serde(default)]
    pub import_dir: Option<PathBuf>,

    /// Regular expression with one capture group for the routing key
    #[serde(default = "default_routing_pattern")]
    pub routing_pattern: String,

    /// Days to keep archived originals; 0 expires everything on the next sweep
    #[serde(default = "default_retention_days")]
    pub archive_retention_days: u64,

    /// Run the archive retention sweep; `false` keeps archived originals forever
    #[serde(default = "default_archive_cleanup")]
    pub archive_cleanup: bool,

    /// Delete non-payload files from the import folder at startup
    #[serde(default)]
    pub import_cleanup: bool,

    /// Extension of routed files, without the dot
    #[serde(default = "default_payload_extension")]
    pub payload_extension: String,

    /// Pause after a creation notification before reading the file
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Grace period for the in-flight file on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Re-run the retention sweeps every N hours (0 = startup only)
    #[serde(default)]
    pub sweep_interval_hours: u64,

    /// Which file timestamp decides an archive entry's age
    #[serde(default)]
    pub archive_timestamp: ArchiveTimestamp,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// Path to the routing audit log (None = no audit log)
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,

    /// Audit log format
    #[serde(default)]
    pub audit_format: AuditFormat,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            inbox_dir: PathBuf::from("/srv/limbus/inbox"),
            destination_root: PathBuf::from("/srv/limbus/patients"),
            archive_dir: PathBuf::from("/srv/limbus/archive"),
            import_dir: None,
            routing_pattern: default_routing_pattern(),
            archive_retention_days: default_retention_days(),
            archive_cleanup: default_archive_cleanup(),
            import_cleanup: false,
            payload_extension: default_payload_extension(),
            settle_delay_ms: default_settle_delay_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            sweep_interval_hours: 0,
            archive_timestamp: ArchiveTimestamp::Created,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
            audit_log_path: None,
            audit_format: AuditFormat::Json,
        }
    }
}

/// File timestamp used to age archive entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveTimestamp {
    /// Creation (birth) time, falling back to modification time when the
    /// platform does not report it
    #[default]
    Created,

    /// Last modification time
    Modified,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Format for audit logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditFormat {
    /// JSON Lines format (one JSON object per line)
    #[default]
    Json,
    /// CSV format with header
    Csv,
}

// Default value functions for serde
fn default_routing_pattern() -> String {
    DEFAULT_ROUTING_PATTERN.to_string()
}

fn default_retention_days() -> u64 {
    30
}

fn default_archive_cleanup() -> bool {
    true
}

fn default_payload_extension() -> String {
    "dcm".to_string()
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl RouterConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RouterError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: RouterConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RouterError::Config(format!("Cannot serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Validate the record and build the immutable routing configuration.
    ///
    /// Paths must be absolute. An unusable routing pattern is not an error:
    /// it is logged and replaced by the default pattern.
    pub fn validate(&self) -> Result<RoutingConfig> {
        require_absolute("inbox_dir", &self.inbox_dir)?;
        require_absolute("destination_root", &self.destination_root)?;
        require_absolute("archive_dir", &self.archive_dir)?;
        if let Some(ref import_dir) = self.import_dir {
            require_absolute("import_dir", import_dir)?;
        }

        let payload_extension = self.payload_extension.trim_start_matches('.').to_string();
        if payload_extension.is_empty() {
            return Err(RouterError::Config(
                "payload_extension must not be empty".to_string(),
            ));
        }

        // Cutoffs are computed with chrono, which bounds a span to i64 milliseconds
        let retention = i64::try_from(self.archive_retention_days)
            .ok()
            .and_then(TimeDelta::try_days);
        if retention.is_none() {
            return Err(RouterError::Config(format!(
                "archive_retention_days {} is out of range",
                self.archive_retention_days
            )));
        }

        let sweep_interval = match self.sweep_interval_hours {
            0 => None,
            hours => Some(Duration::from_secs(hours.checked_mul(3600).ok_or_else(|| {
                RouterError::Config(format!("sweep_interval_hours {} is out of range", hours))
            })?)),
        };

        Ok(RoutingConfig {
            inbox_dir: self.inbox_dir.clone(),
            destination_root: self.destination_root.clone(),
            archive_dir: self.archive_dir.clone(),
            import_dir: self.import_dir.clone(),
            pattern: RoutingPattern::compile_or_default(&self.routing_pattern),
            archive_retention_days: self.archive_retention_days,
            archive_cleanup: self.archive_cleanup,
            import_cleanup: self.import_cleanup,
            payload_extension,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            sweep_interval,
            archive_timestamp: self.archive_timestamp,
        })
    }
}

fn require_absolute(field: &str, path: &Path) -> Result<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(RouterError::Config(format!(
            "{} must be an absolute path, got {}",
            field,
            path.display()
        )))
    }
}

/// Validated, immutable configuration for one run of the routing core
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub inbox_dir: PathBuf,
    pub destination_root: PathBuf,
    pub archive_dir: PathBuf,
    pub import_dir: Option<PathBuf>,
    pub pattern: RoutingPattern,
    pub archive_retention_days: u64,
    pub archive_cleanup: bool,
    pub import_cleanup: bool,
    /// Extension without the dot, compared case-insensitively
    pub payload_extension: String,
    pub settle_delay: Duration,
    pub shutdown_grace: Duration,
    pub sweep_interval: Option<Duration>,
    pub archive_timestamp: ArchiveTimestamp,
}

impl RoutingConfig {
    /// Whether `path` carries the payload extension (case-insensitive)
    pub fn is_payload(&self, path: &Path) -> bool {
        has_extension(path, &self.payload_extension)
    }

    /// Folders that must exist before the service can do anything useful
    pub fn required_folders(&self) -> Vec<&Path> {
        let mut folders = vec![
            self.inbox_dir.as_path(),
            self.destination_root.as_path(),
            self.archive_dir.as_path(),
        ];
        if let Some(ref import_dir) = self.import_dir {
            folders.push(import_dir.as_path());
        }
        folders
    }
}

/// Case-insensitive extension check; `extension` has no leading dot
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

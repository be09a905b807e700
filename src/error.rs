/*!
 * Error types for the inbox router
 */

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RouterError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum RouterError {
    /// Source file vanished before it could be processed
    SourceNotFound(PathBuf),

    /// Path that cannot be used (relative, no file name, ...)
    InvalidPath(PathBuf),

    /// I/O error
    Io(io::Error),

    /// A required top-level folder could not be created
    FolderSetup { path: PathBuf, source: io::Error },

    /// Both the plain and the timestamped archive names are taken
    ArchiveCollision(PathBuf),

    /// Configuration error
    Config(String),

    /// Filesystem watcher could not be created or armed
    Watch(String),

    /// Audit log error
    AuditLog(String),

    /// Generic error with message
    Other(String),
}

impl RouterError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            EXIT_FATAL
        } else {
            EXIT_PARTIAL
        }
    }

    /// Errors that stop the whole service rather than a single file
    pub fn is_fatal(&self) -> bool {
        match self {
            RouterError::FolderSetup { .. } => true,
            RouterError::Config(_) => true,
            RouterError::InvalidPath(_) => true,
            RouterError::Watch(_) => true,

            RouterError::SourceNotFound(_) => false,
            RouterError::Io(_) => false,
            RouterError::ArchiveCollision(_) => false,
            RouterError::AuditLog(_) => false,
            RouterError::Other(_) => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            RouterError::SourceNotFound(_) | RouterError::InvalidPath(_) => {
                ErrorCategory::Validation
            }
            RouterError::Io(_) => ErrorCategory::IoError,
            RouterError::FolderSetup { .. } => ErrorCategory::Startup,
            RouterError::ArchiveCollision(_) => ErrorCategory::Archive,
            RouterError::Config(_) => ErrorCategory::Configuration,
            RouterError::Watch(_) => ErrorCategory::Watch,
            RouterError::AuditLog(_) => ErrorCategory::Audit,
            RouterError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Path validation errors
    Validation,
    /// I/O operation errors
    IoError,
    /// Required folders missing and not creatable
    Startup,
    /// Archive name collisions
    Archive,
    /// Configuration errors
    Configuration,
    /// Filesystem notification errors
    Watch,
    /// Audit logging errors
    Audit,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Startup => write!(f, "startup"),
            ErrorCategory::Archive => write!(f, "archive"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Watch => write!(f, "watch"),
            ErrorCategory::Audit => write!(f, "audit"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::SourceNotFound(path) => {
                write!(f, "Source not found: {}", path.display())
            }
            RouterError::InvalidPath(path) => {
                write!(f, "Invalid path: {}", path.display())
            }
            RouterError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            RouterError::FolderSetup { path, source } => {
                write!(
                    f,
                    "Cannot create required folder {}: {}",
                    path.display(),
                    source
                )
            }
            RouterError::ArchiveCollision(path) => {
                write!(f, "Archive target already exists: {}", path.display())
            }
            RouterError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            RouterError::Watch(msg) => {
                write!(f, "Watcher error: {}", msg)
            }
            RouterError::AuditLog(msg) => {
                write!(f, "Audit log error: {}", msg)
            }
            RouterError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for RouterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouterError::Io(err) => Some(err),
            RouterError::FolderSetup { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for RouterError {
    fn from(err: io::Error) -> Self {
        RouterError::Io(err)
    }
}

impl From<toml::de::Error> for RouterError {
    fn from(err: toml::de::Error) -> Self {
        RouterError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<notify::Error> for RouterError {
    fn from(err: notify::Error) -> Self {
        RouterError::Watch(err.to_string())
    }
}

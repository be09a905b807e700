/*!
 * Limbus Router - inbox file router
 *
 * Watches an inbox folder for payload files, derives a routing key from each
 * file name, copies the file into the matching destination folder and moves
 * the original into an archive. Retention sweeps keep the archive and the
 * import folder from growing without bound.
 *
 * - Regex-based routing keys (first capture group)
 * - Destination lookup by exact folder name, one level deep
 * - Collision-safe archiving with timestamp suffixes
 * - Age-based archive retention and import folder cleanup
 * - Startup scan, settling delay and bounded-grace shutdown
 * - JSON Lines or CSV audit trail
 */

pub mod audit;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod service;
pub mod stats;

// Re-export commonly used types
pub use audit::{AuditLogger, RouteEvent};
pub use config::{ArchiveTimestamp, AuditFormat, LogLevel, RouterConfig, RoutingConfig};
pub use crate::core::{
    archive_file, extract_key, resolve_destination, RetentionSweeper, RouteOutcome,
    RoutingPattern, RoutingPipeline, ScanSummary, SweepReport, SweepSummary, WatchService,
};
pub use error::{Result, RouterError};
pub use service::{RouterService, RunReport};
pub use stats::RouteStats;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}

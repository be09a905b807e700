/*!
 * Core routing engine
 *
 * Matching a file name to a routing key, finding the destination folder,
 * copying and archiving, the retention sweeps, and the inbox watcher.
 */

pub mod archive;
pub mod matcher;
pub mod pipeline;
pub mod resolver;
pub mod retention;
pub mod watch;

pub use archive::archive_file;
pub use matcher::{extract_key, RoutingPattern, DEFAULT_ROUTING_PATTERN};
pub use pipeline::{RouteOutcome, RoutingPipeline, ScanSummary};
pub use resolver::resolve_destination;
pub use retention::{RetentionSweeper, SweepReport, SweepSummary};
pub use watch::{InboxWatcher, WatchService};

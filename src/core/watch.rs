/*!
 * Inbox watching
 *
 * [`InboxWatcher`] turns filesystem notifications for the inbox into paths on
 * a channel. [`WatchService`] owns the watcher plus the single worker thread
 * that runs one pipeline pass per notified file.
 */

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use super::pipeline::{RoutingPipeline, ScanSummary};
use crate::config::has_extension;
use crate::error::{Result, RouterError};

/// Filesystem watcher for payload files arriving in the inbox
pub struct InboxWatcher {
    watcher: RecommendedWatcher,
    inbox: PathBuf,
}

impl InboxWatcher {
    /// Watch `inbox` (non-recursively) and send arriving payload files to `tx`
    pub fn new(inbox: &Path, payload_extension: &str, tx: Sender<PathBuf>) -> Result<Self> {
        let extension = payload_extension.to_string();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in arrived_paths(&event) {
                    if has_extension(&path, &extension) {
                        // Receiver gone means the service is shutting down
                        let _ = tx.send(path);
                    }
                }
            }
            Err(e) => warn!("inbox watcher error: {}", e),
        })
        .map_err(|e| RouterError::Watch(format!("Failed to create inbox watcher: {}", e)))?;

        watcher
            .watch(inbox, RecursiveMode::NonRecursive)
            .map_err(|e| {
                RouterError::Watch(format!("Failed to watch {}: {}", inbox.display(), e))
            })?;

        Ok(Self {
            watcher,
            inbox: inbox.to_path_buf(),
        })
    }

    /// Get the path being monitored
    pub fn monitored_path(&self) -> &Path {
        &self.inbox
    }

    /// Unsubscribe and drop the watcher; no notification is delivered afterwards
    pub fn close(mut self) {
        if let Err(e) = self.watcher.unwatch(&self.inbox) {
            debug!(inbox = %self.inbox.display(), "unwatch failed: {}", e);
        }
    }
}

/// Paths that newly appeared: created files and files renamed into the folder
fn arrived_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any) => {
            event.paths.clone()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        // FSEvents does not say which side of the rename this is; paths that
        // left the inbox fail the existence check after the settle delay
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => event.paths.clone(),
        // [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// Running watcher plus worker thread
pub struct WatchService {
    watcher: Option<InboxWatcher>,
    stopping: Arc<AtomicBool>,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    worker: Option<JoinHandle<ScanSummary>>,
}

impl WatchService {
    /// Arm the inbox watcher and start processing notifications
    pub fn start(pipeline: RoutingPipeline) -> Result<Self> {
        let (events_tx, events_rx) = unbounded::<PathBuf>();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let stopping = Arc::new(AtomicBool::new(false));

        let inbox = pipeline.config().inbox_dir.clone();
        let extension = pipeline.config().payload_extension.clone();

        let worker_stopping = Arc::clone(&stopping);
        let worker = thread::Builder::new()
            .name("inbox-worker".to_string())
            .spawn(move || {
                let summary = process_notifications(&pipeline, events_rx, stop_rx, &worker_stopping);
                let _ = done_tx.send(());
                summary
            })
            .map_err(|e| RouterError::Other(format!("Failed to spawn inbox worker: {}", e)))?;

        let watcher = InboxWatcher::new(&inbox, &extension, events_tx)?;
        info!(inbox = %inbox.display(), "watching inbox");

        Ok(Self {
            watcher: Some(watcher),
            stopping,
            stop_tx,
            done_rx,
            worker: Some(worker),
        })
    }

    /// Stop watching and wait up to `grace` for the in-flight pass.
    ///
    /// Returns the counts for the notified files, or `None` when the worker
    /// did not finish in time and was abandoned.
    pub fn shutdown(mut self, grace: Duration) -> Option<ScanSummary> {
        if let Some(watcher) = self.watcher.take() {
            watcher.close();
        }
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.stop_tx.try_send(());

        match self.done_rx.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    grace_secs = grace.as_secs(),
                    "in-flight file did not finish within shutdown grace period, abandoning worker"
                );
                // Dropping the handle detaches the thread; process exit ends it
                self.worker.take();
                return None;
            }
        }

        let worker = self.worker.take()?;
        match worker.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                error!("inbox worker panicked");
                None
            }
        }
    }
}

fn process_notifications(
    pipeline: &RoutingPipeline,
    events_rx: Receiver<PathBuf>,
    stop_rx: Receiver<()>,
    stopping: &AtomicBool,
) -> ScanSummary {
    let mut summary = ScanSummary::default();
    loop {
        let next = select! {
            recv(events_rx) -> msg => msg.ok(),
            recv(stop_rx) -> _ => None,
        };
        let Some(path) = next else { break };
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        if let Some(outcome) = pipeline.process_notified(&path) {
            summary.record(&outcome);
        }
    }
    debug!(files = summary.files, "inbox worker stopped");
    summary
}

/*!
 * Long-running router service
 *
 * Startup order: create required folders, run the retention sweeps, route
 * whatever is already in the inbox, then arm the watcher. Everything before
 * the watcher runs on the calling thread, so no notification can be handled
 * while the startup scan is still going.
 */

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::audit::{AuditLogger, RouteEvent};
use crate::config::RoutingConfig;
use crate::core::pipeline::{RoutingPipeline, ScanSummary};
use crate::core::retention::{RetentionSweeper, SweepSummary};
use crate::core::watch::WatchService;
use crate::error::{Result, RouterError};

/// What happened during one service run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub sweeps: SweepSummary,
    pub startup_scan: ScanSummary,
    /// Files handled from watch notifications; `None` if the worker was abandoned
    pub watched: Option<ScanSummary>,
}

impl RunReport {
    /// Whether any file or archive entry hit an I/O failure
    pub fn had_failures(&self) -> bool {
        self.startup_scan.failed > 0
            || self.watched.as_ref().map_or(false, |w| w.failed > 0)
            || self.sweeps.failed() > 0
    }
}

/// The routing core wired together with its startup and shutdown sequence
pub struct RouterService {
    config: Arc<RoutingConfig>,
    pipeline: RoutingPipeline,
    sweeper: Arc<RetentionSweeper>,
    audit: Option<Arc<AuditLogger>>,
}

impl RouterService {
    pub fn new(config: RoutingConfig) -> Self {
        let config = Arc::new(config);
        Self {
            pipeline: RoutingPipeline::new(Arc::clone(&config)),
            config,
            sweeper: Arc::new(RetentionSweeper::new()),
            audit: None,
        }
    }

    /// Record routing outcomes and sweeps in `audit`
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.pipeline = self.pipeline.with_audit(Arc::clone(&audit));
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &RoutingPipeline {
        &self.pipeline
    }

    /// Create every required top-level folder; failure here stops the service
    pub fn ensure_folders(&self) -> Result<()> {
        for folder in self.config.required_folders() {
            if let Err(source) = fs::create_dir_all(folder) {
                error!(folder = %folder.display(), "cannot create required folder: {}", source);
                return Err(RouterError::FolderSetup {
                    path: folder.to_path_buf(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Run the enabled retention sweeps once
    pub fn run_sweeps(&self) -> SweepSummary {
        run_sweeps(&self.sweeper, &self.config, self.audit.as_deref())
    }

    /// Folders, sweeps and the startup scan, in that order
    pub fn startup(&self) -> Result<(SweepSummary, ScanSummary)> {
        if self.config.pattern.is_fallback() {
            warn!(
                pattern = self.config.pattern.as_str(),
                "running with the default routing pattern"
            );
        }

        self.ensure_folders()?;
        let sweeps = self.run_sweeps();

        let scan = match self.pipeline.startup_scan() {
            Ok(scan) => scan,
            Err(e) => {
                error!(inbox = %self.config.inbox_dir.display(), "startup scan failed: {}", e);
                ScanSummary::default()
            }
        };
        Ok((sweeps, scan))
    }

    /// Run until `shutdown` fires (or its sender is dropped)
    pub fn run(&self, shutdown: Receiver<()>) -> Result<RunReport> {
        let (sweeps, startup_scan) = self.startup()?;

        let watch = WatchService::start(self.pipeline.clone())?;
        let periodic = self
            .config
            .sweep_interval
            .map(|interval| self.spawn_periodic_sweeps(interval));

        info!("router running");
        let _ = shutdown.recv();
        info!("shutdown requested");

        // Disconnecting the stop channel ends the sweep thread once any
        // running sweep completes; it is not joined
        drop(periodic);
        let watched = watch.shutdown(self.config.shutdown_grace);

        info!("router stopped");
        Ok(RunReport {
            sweeps,
            startup_scan,
            watched,
        })
    }

    fn spawn_periodic_sweeps(&self, interval: Duration) -> Sender<()> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let sweeper = Arc::clone(&self.sweeper);
        let config = Arc::clone(&self.config);
        let audit = self.audit.clone();

        let spawned = thread::Builder::new()
            .name("retention-sweeper".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    let fire = select! {
                        recv(ticker) -> _ => true,
                        recv(stop_rx) -> _ => false,
                    };
                    if !fire {
                        break;
                    }
                    run_sweeps(&sweeper, &config, audit.as_deref());
                }
                debug!("periodic sweeps stopped");
            });

        match spawned {
            Ok(_) => info!(interval_secs = interval.as_secs(), "periodic sweeps scheduled"),
            Err(e) => error!("cannot start periodic sweeps: {}", e),
        }
        stop_tx
    }
}

fn run_sweeps(
    sweeper: &RetentionSweeper,
    config: &RoutingConfig,
    audit: Option<&AuditLogger>,
) -> SweepSummary {
    let summary = sweeper.sweep_all(config);

    if let Some(audit) = audit {
        for report in summary.archive.iter().chain(summary.import.iter()) {
            if let Err(e) = audit.emit(&RouteEvent::from_sweep(report)) {
                warn!(folder = %report.folder.display(), "audit record not written: {}", e);
            }
        }
    }
    summary
}

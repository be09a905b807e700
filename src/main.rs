/*!
 * Limbus Router CLI
 *
 * Runs the inbox router as a long-lived service, or one piece of it
 * (a scan, a single file, the sweeps) for operators and cron jobs.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use limbus_router::{
    config::{LogLevel, RouterConfig},
    error::{Result, RouterError, EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS},
    logging, AuditLogger, RouteStats, RouterService, SweepReport,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "limbus-router")]
#[command(version, about = "Route inbox files to destination folders and archive them", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration file)
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Log file path (JSON lines; stdout if omitted)
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Verbose output (debug level)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the router until interrupted (default)
    Run,

    /// Route whatever is in the inbox once, then exit
    Scan,

    /// Run one routing pass for a single file
    Route {
        /// File to route
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Run the archive retention and import cleanup sweeps once
    Sweep,

    /// Validate the configuration and print it
    CheckConfig,

    /// Write a default configuration file
    InitConfig {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Summarise the audit log
    Stats,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    // Commands that never touch the configured folders
    match command {
        Commands::InitConfig { ref path } => return init_config(path),
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "limbus-router", &mut std::io::stdout());
            return Ok(EXIT_SUCCESS);
        }
        _ => {}
    }

    let mut config = match cli.config {
        Some(ref path) => RouterConfig::from_file(path)?,
        None => RouterConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    if !matches!(command, Commands::Stats) {
        if let Err(e) = logging::init_logging(&config) {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }
    }

    match command {
        Commands::Run => run_service(&config),
        Commands::Scan => scan_once(&config),
        Commands::Route { file } => route_one(&config, &file),
        Commands::Sweep => sweep_once(&config),
        Commands::CheckConfig => check_config(&config),
        Commands::Stats => print_stats(&config),
        Commands::InitConfig { .. } | Commands::Completions { .. } => Ok(EXIT_SUCCESS),
    }
}

/// Build the service, attaching the audit logger when one is configured
fn build_service(config: &RouterConfig) -> Result<RouterService> {
    let service = RouterService::new(config.validate()?);
    match config.audit_log_path {
        Some(ref path) => {
            let audit = AuditLogger::new(path, config.audit_format)?;
            Ok(service.with_audit(Arc::new(audit)))
        }
        None => Ok(service),
    }
}

fn partial_if(failed: bool) -> i32 {
    if failed {
        EXIT_PARTIAL
    } else {
        EXIT_SUCCESS
    }
}

fn run_service(config: &RouterConfig) -> Result<i32> {
    let service = build_service(config)?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        info!("received interrupt, shutting down");
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| RouterError::Other(format!("Failed to install signal handler: {}", e)))?;

    let report = service.run(shutdown_rx)?;
    info!(
        startup_files = report.startup_scan.files,
        watched_files = report.watched.as_ref().map_or(0, |w| w.files),
        "router exited"
    );

    if report.watched.is_none() {
        // Abandoned worker thread; leave immediately instead of joining it
        return Ok(EXIT_PARTIAL);
    }
    Ok(partial_if(report.had_failures()))
}

fn scan_once(config: &RouterConfig) -> Result<i32> {
    let service = build_service(config)?;
    let (_, scan) = service.startup()?;

    println!(
        "Scanned {} file(s): {} archived, {} unroutable, {} without destination, {} failed",
        scan.files, scan.archived, scan.unroutable, scan.not_found, scan.failed
    );
    Ok(partial_if(scan.failed > 0))
}

fn route_one(config: &RouterConfig, file: &Path) -> Result<i32> {
    let service = build_service(config)?;
    service.ensure_folders()?;

    let file = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()?.join(file)
    };
    if !file.is_file() {
        return Err(RouterError::SourceNotFound(file));
    }

    let outcome = service.pipeline().process(&file);
    println!("{}: {}", file.display(), outcome.status());
    if let Some(destination) = outcome.destination() {
        println!("  destination: {}", destination.display());
    }
    if let Some(error) = outcome.error() {
        println!("  error: {}", error);
    }
    Ok(partial_if(outcome.is_failure()))
}

fn sweep_once(config: &RouterConfig) -> Result<i32> {
    let service = build_service(config)?;
    service.ensure_folders()?;
    let summary = service.run_sweeps();

    let print = |label: &str, report: &Option<SweepReport>| match report {
        Some(r) if r.skipped => println!("{}: skipped, another sweep is running", label),
        Some(r) => println!(
            "{}: {} examined, {} deleted, {} failed",
            label, r.examined, r.deleted, r.failed
        ),
        None => println!("{}: disabled", label),
    };
    print("archive", &summary.archive);
    print("import", &summary.import);

    Ok(partial_if(summary.failed() > 0))
}

fn check_config(config: &RouterConfig) -> Result<i32> {
    let routing = config.validate()?;
    if routing.pattern.is_fallback() {
        eprintln!(
            "Warning: routing pattern {:?} is unusable, the default {:?} would be used",
            config.routing_pattern,
            routing.pattern.as_str()
        );
    }

    let rendered = toml::to_string_pretty(config)
        .map_err(|e| RouterError::Config(format!("Cannot serialize config: {}", e)))?;
    println!("{}", rendered);
    Ok(if routing.pattern.is_fallback() {
        EXIT_PARTIAL
    } else {
        EXIT_SUCCESS
    })
}

fn init_config(path: &Path) -> Result<i32> {
    if path.exists() {
        return Err(RouterError::Config(format!(
            "{} already exists, not overwriting",
            path.display()
        )));
    }
    RouterConfig::default().to_file(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(EXIT_SUCCESS)
}

fn print_stats(config: &RouterConfig) -> Result<i32> {
    let Some(ref path) = config.audit_log_path else {
        return Err(RouterError::Config(
            "audit_log_path is not set; nothing to summarise".to_string(),
        ));
    };
    RouteStats::from_audit_log(path, config.audit_format)?.print();
    Ok(EXIT_SUCCESS)
}

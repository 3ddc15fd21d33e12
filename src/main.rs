// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Pictor: Local AI-assisted Image Organizer
//!
//! Sorts the images dropped into a library's intake folder into category
//! folders, renaming each one from what local vision models see in it.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use pictor::capabilities::vision::OllamaLoader;
use pictor::capabilities::{Capability, CapabilityStatus, Registry};
use pictor::config::AppConfig;
use pictor::fs::{FileSystem, LocalFs};
use pictor::ollama::OllamaClient;
use pictor::report::SessionReport;
use pictor::session::{Organizer, SessionOutcome};
use pictor::watcher::{wait_for_stable, IntakeWatcher, WatchEvent};
use pictor::{PictorError, Result};

/// Pictor CLI - Local AI Image Organizer
#[derive(Parser, Debug)]
#[command(name = "pictor")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Local AI-powered image organizer", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Organize every image waiting in the intake folder
    Organize {
        /// Use heuristics only, never contact the AI engine
        #[arg(long)]
        offline: bool,
    },

    /// Copy images from a directory into the intake folder
    Import {
        /// Directory to import from
        source: PathBuf,
    },

    /// Watch the intake folder and organize new images as they arrive
    Watch {
        /// Use heuristics only, never contact the AI engine
        #[arg(long)]
        offline: bool,
    },

    /// Show image counts per library folder
    Stats,

    /// Show AI engine and capability status
    Status,

    /// Show recent session reports
    History {
        /// Number of reports to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Initialize a new Pictor library
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !cli.quiet {
        info!("Pictor v{} - Local AI Image Organizer", env!("CARGO_PKG_VERSION"));
    }

    let format = cli.format.as_str();
    let command = cli.command.unwrap_or(Commands::Organize { offline: false });

    // Init must work before any config exists
    if let Commands::Init { dir, force } = command {
        return run_init(dir, force).await;
    }

    let config = AppConfig::load(&cli.config)?;

    match command {
        Commands::Organize { offline } => run_organize(config, offline, format, cli.quiet).await,
        Commands::Import { source } => run_import(config, source, format).await,
        Commands::Watch { offline } => run_watch(config, offline).await,
        Commands::Stats => run_stats(config, format).await,
        Commands::Status => run_status(config, format).await,
        Commands::History { count } => run_history(config, count, format).await,
        Commands::Config { action } => run_config_command(config, action, &cli.config),
        Commands::Init { .. } => Ok(()),
    }
}

/// Bring up the capability registry, falling back per capability
async fn build_registry(config: &AppConfig, offline: bool) -> Result<Arc<Registry>> {
    if offline {
        warn!("OFFLINE MODE - using heuristics for every capability");
        return Ok(Arc::new(Registry::heuristic(&config.capabilities, &config.thresholds)));
    }

    let client = OllamaClient::new(
        &config.ai_engine.url,
        Duration::from_secs(config.ai_engine.timeout_secs),
    )?;

    info!("Checking Ollama availability...");
    match client.health_check().await {
        Ok(()) => info!("Ollama is running at {}", client.base_url()),
        Err(e) => warn!("Ollama not reachable ({}); capabilities will use heuristics", e),
    }

    let loader = Arc::new(OllamaLoader::new(client, config.ai_engine.models.clone()));
    let registry = Registry::initialize(loader, &config.capabilities, &config.thresholds).await;

    for (capability, status) in registry.statuses() {
        debug!("{}: {:?}", capability, status);
    }
    Ok(Arc::new(registry))
}

fn local_organizer(config: &AppConfig, registry: Arc<Registry>) -> Organizer {
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFs);
    Organizer::new(config, registry, fs)
}

/// Log progress events until the sender goes away
fn spawn_progress_logger(mut rx: broadcast::Receiver<pictor::session::ProgressEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!("[{}/{}] {}", event.current, event.total, event.current_file),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Progress logger skipped {} events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Run one organize session
async fn run_organize(config: AppConfig, offline: bool, format: &str, quiet: bool) -> Result<()> {
    let registry = build_registry(&config, offline).await?;
    let organizer = local_organizer(&config, registry);
    organizer.prepare_layout().await?;

    if !quiet {
        spawn_progress_logger(organizer.subscribe());
    }

    match organizer.start().await? {
        SessionOutcome::Completed(report) => print_report(&report, format)?,
        SessionOutcome::NoInput { intake } => match format {
            "json" => println!("{}", serde_json::json!({ "noInput": intake })),
            _ => println!("No images found in {}", intake.display()),
        },
    }
    Ok(())
}

fn print_report(report: &SessionReport, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Session {}", report.session_id);
    println!(
        "  Processed: {}/{}  ({} successful, {} errors)",
        report.processed, report.total, report.successful, report.errors
    );
    for (category, count) in report.categories.iter().filter(|(_, n)| **n > 0) {
        println!("  {:<12} {}", category, count);
    }
    println!("  Time: {} ms", report.processing_time_ms);
    Ok(())
}

/// Copy images into the intake folder
async fn run_import(config: AppConfig, source: PathBuf, format: &str) -> Result<()> {
    let registry = Arc::new(Registry::heuristic(&config.capabilities, &config.thresholds));
    let organizer = local_organizer(&config, registry);
    let count = organizer.import(&source).await?;

    match format {
        "json" => println!("{}", serde_json::json!({ "imported": count })),
        _ => println!("Imported {} images into {}", count, organizer.layout().intake().display()),
    }
    Ok(())
}

/// Show library statistics
async fn run_stats(config: AppConfig, format: &str) -> Result<()> {
    let registry = Arc::new(Registry::heuristic(&config.capabilities, &config.thresholds));
    let organizer = local_organizer(&config, registry);
    let stats = organizer.stats().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Library: {}", stats.base_path.display());
    println!("  Waiting in intake: {}", stats.raw_images);
    for (category, count) in &stats.categorized {
        println!("  {:<12} {}", category, count);
    }
    Ok(())
}

/// Run the watch mode: organize whenever the intake goes quiet
async fn run_watch(config: AppConfig, offline: bool) -> Result<()> {
    let registry = build_registry(&config, offline).await?;
    let organizer = local_organizer(&config, registry);
    organizer.prepare_layout().await?;
    spawn_progress_logger(organizer.subscribe());

    let watcher = IntakeWatcher::new(&organizer.layout().intake())?;
    let settle = Duration::from_secs(config.watch.settle_secs);

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });

    info!("Watching {:?}. Press Ctrl+C to stop.", watcher.intake());

    // Pick up anything already waiting once the first settle period passes
    let mut last_arrival: Option<Instant> = Some(Instant::now());

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match watcher.next_event(Duration::from_millis(100)) {
            Some(WatchEvent::ImageArrived(path)) => {
                if wait_for_stable(&path, settle).await {
                    debug!("New image settled: {:?}", path);
                    last_arrival = Some(Instant::now());
                }
            }
            Some(WatchEvent::Error(e)) => warn!("Watch error: {}", e),
            None => {}
        }

        let quiet_long_enough = last_arrival.is_some_and(|at| at.elapsed() >= settle);
        if quiet_long_enough {
            last_arrival = None;
            match organizer.start().await {
                Ok(SessionOutcome::Completed(report)) => info!(
                    "Organized {} images ({} errors)",
                    report.successful, report.errors
                ),
                Ok(SessionOutcome::NoInput { .. }) => debug!("Intake empty"),
                Err(PictorError::SessionAlreadyActive) => {
                    last_arrival = Some(Instant::now());
                }
                Err(e) => error!("Session failed: {}", e),
            }
        }
    }

    info!("Pictor stopped.");
    Ok(())
}

/// Show recent session reports
async fn run_history(config: AppConfig, count: usize, format: &str) -> Result<()> {
    let registry = Arc::new(Registry::heuristic(&config.capabilities, &config.thresholds));
    let organizer = local_organizer(&config, registry);
    let reports = organizer.reports().recent(count).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!(
        "Recent sessions in {} ({} reports):",
        organizer.reports().dir().display(),
        reports.len()
    );
    for report in reports {
        println!(
            "  {} {}  {}/{} ok, {} errors, {} ms",
            report.started_at.format("%Y-%m-%d %H:%M"),
            report.session_id,
            report.successful,
            report.total,
            report.errors,
            report.processing_time_ms
        );
    }
    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            // load() already validated
            println!("Configuration at {:?} is valid", config_path);
            println!("  Library: {}", config.library.base_path.display());
            println!("  AI engine: {}", config.ai_engine.url);
            println!("  Classifier model: {}", config.ai_engine.models.classifier);
        }
    }

    Ok(())
}

/// Run status check
async fn run_status(config: AppConfig, format: &str) -> Result<()> {
    let client = OllamaClient::new(
        &config.ai_engine.url,
        Duration::from_secs(config.ai_engine.timeout_secs),
    )?;
    let engine = client.health_check().await;
    let models = client.list_models().await.unwrap_or_default();
    let organizer = local_organizer(&config, build_registry(&config, false).await?);

    let statuses: BTreeMap<Capability, &CapabilityStatus> =
        organizer.registry().statuses().collect();

    if format == "json" {
        let value = serde_json::json!({
            "engine": {
                "url": client.base_url(),
                "running": engine.is_ok(),
                "models": models,
            },
            "capabilities": statuses,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Pictor v{} Status", env!("CARGO_PKG_VERSION"));
    println!("====================");

    match engine {
        Ok(()) => println!("Ollama: Running ({})", client.base_url()),
        Err(e) => println!("Ollama: Error - {}", e),
    }
    if !models.is_empty() {
        println!("\nAvailable models:");
        for m in &models {
            println!("  {}", m);
        }
    }

    println!("\nCapabilities:");
    for (capability, status) in statuses {
        let line = match status {
            CapabilityStatus::Model { provider } => format!("model ({})", provider),
            CapabilityStatus::Heuristic { provider, reason } => {
                format!("heuristic ({}) - {}", provider, reason)
            }
            CapabilityStatus::Disabled => "disabled".to_string(),
        };
        println!("  {:<16} {}", capability, line);
    }

    Ok(())
}

/// Initialize a new Pictor library
async fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(PictorError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }
    std::fs::create_dir_all(&target)?;

    let mut config = AppConfig::default();
    config.library.base_path = target.join("library");
    config.save(&config_path)?;

    let registry = Arc::new(Registry::heuristic(&config.capabilities, &config.thresholds));
    let organizer = local_organizer(&config, registry);
    organizer.prepare_layout().await?;

    println!("Pictor initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - library/images/raw/");
    println!("  - library/images/classified/<category>/");
    println!("  - library/images/renamed/");
    println!("  - library/logs/");
    println!("\nNext steps:");
    println!("  1. Drop images into {}", organizer.layout().intake().display());
    println!("  2. Run: pictor organize");

    Ok(())
}

//! Usage-Keeper main entry point
//!
//! This is the command-line interface for the Usage-Keeper scraper.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use usage_keeper::browser::HttpBrowser;
use usage_keeper::config::{load_config_with_hash, Config};
use usage_keeper::orchestrator::{CycleOutcome, Orchestrator, RunExit};
use usage_keeper::{ScrapeError, SessionValidator, VersionedStorage};

/// Usage-Keeper: a resilient usage scraper
///
/// Usage-Keeper scrapes the console usage page through a persisted browser
/// session, keeps every snapshot as an immutable version on disk and ships
/// it to a remote endpoint.
#[derive(Parser, Debug)]
#[command(name = "usage-keeper")]
#[command(version)]
#[command(about = "A resilient usage scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Run a single scrape, persist and sync cycle, then exit
    #[arg(long, group = "mode")]
    once: bool,

    /// Validate the persisted browser session and exit
    #[arg(long, group = "mode")]
    check_session: bool,

    /// Print the newest N stored versions and exit
    #[arg(
        long,
        value_name = "N",
        num_args = 0..=1,
        default_missing_value = "10",
        group = "mode"
    )]
    list_versions: Option<usize>,

    /// Apply version retention and exit
    #[arg(long, group = "mode")]
    cleanup: bool,

    /// Validate config and print the effective settings without scraping
    #[arg(long, group = "mode")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &config_hash);
        Ok(ExitCode::SUCCESS)
    } else if cli.check_session {
        handle_check_session(&config).await
    } else if let Some(limit) = cli.list_versions {
        handle_list_versions(&config, limit).await
    } else if cli.cleanup {
        handle_cleanup(&config).await
    } else if cli.once {
        handle_once(&config).await
    } else {
        handle_run(&config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("usage_keeper=info,warn"),
            1 => EnvFilter::new("usage_keeper=debug,info"),
            2 => EnvFilter::new("usage_keeper=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn launcher(config: &Config) -> Arc<HttpBrowser> {
    Arc::new(HttpBrowser::new(config.session.cookie_file.clone()))
}

/// Prints a remediation block for failures that need a human
fn print_remediation(error: &ScrapeError) {
    eprintln!("\n=== Manual action required ===");
    eprintln!("Category: {}", error.category);
    eprintln!("Error:    {}", error.message);
    if let Some(remedy) = error.category.remediation() {
        eprintln!("Fix:      {}", remedy);
    }
}

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config, config_hash: &str) {
    println!("=== Usage-Keeper Dry Run ===\n");

    println!("Session:");
    println!("  Profile directory: {}", config.session.profile_dir);
    println!("  Usage URL: {}", config.session.usage_url);
    println!("  Login pattern: {}", config.session.login_url_pattern);
    println!(
        "  Navigation timeout: {}s",
        config.session.navigation_timeout_secs
    );

    println!("\nScraper:");
    println!("  Section timeout: {}s", config.scraper.section_timeout_secs);
    println!(
        "  Sections: {:?}, {:?}, {:?}",
        config.scraper.current_session_label,
        config.scraper.all_models_label,
        config.scraper.sonnet_only_label
    );

    println!("\nRetry:");
    println!(
        "  Backoff: {}ms base, {}ms max, {}s jitter, {} attempts",
        config.retry.base_delay_ms,
        config.retry.max_delay_ms,
        config.retry.jitter_secs,
        config.retry.max_attempts
    );
    println!(
        "  Circuit breaker: open after {} failures for {}ms, close after {} successes",
        config.retry.failure_threshold,
        config.retry.open_duration_ms,
        config.retry.success_threshold
    );

    println!("\nStorage:");
    println!("  Directory: {}", config.storage.directory);
    println!(
        "  Retention: {} days, at least {} versions",
        config.storage.retention_days, config.storage.max_versions
    );

    println!("\nSync:");
    if config.sync.enabled {
        println!("  Endpoint: {}", config.sync.endpoint);
        println!("  Retry ladder: {:?}s", config.sync.retry_delays_secs);
    } else {
        println!("  Disabled");
    }

    println!("\nSchedule:");
    println!("  Interval: {}s", config.schedule.interval_secs);
    println!(
        "  Maintenance: every {} runs or above {} MB of cache",
        config.schedule.maintenance_every_runs, config.schedule.cache_size_threshold_mb
    );

    println!("\n✓ Configuration is valid (hash: {})", config_hash);
}

/// Handles the --check-session mode
async fn handle_check_session(config: &Config) -> anyhow::Result<ExitCode> {
    let validator = SessionValidator::new(launcher(config), config.session.clone());
    let result = validator.validate(true).await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.valid {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Handles the --list-versions mode
async fn handle_list_versions(config: &Config, limit: usize) -> anyhow::Result<ExitCode> {
    let storage = VersionedStorage::from_config(&config.storage)?;
    let versions = storage.list_versions(Some(limit)).await?;

    println!("Storage: {}\n", storage.dir().display());
    for path in &versions {
        println!("{}", path.display());
    }

    let metadata = storage.metadata().await;
    println!(
        "\n{} shown, {} stored, {} created, {} deleted",
        versions.len(),
        metadata.version_count,
        metadata.total_versions_created,
        metadata.total_versions_deleted
    );

    Ok(ExitCode::SUCCESS)
}

/// Handles the --cleanup mode
async fn handle_cleanup(config: &Config) -> anyhow::Result<ExitCode> {
    let storage = VersionedStorage::from_config(&config.storage)?;
    let report = storage.cleanup_old_versions().await?;

    println!(
        "✓ Retention applied: {} kept, {} deleted, {} failed",
        report.kept, report.deleted, report.failed
    );

    Ok(ExitCode::SUCCESS)
}

/// Handles the --once mode: one cycle, exit status reflects the outcome
async fn handle_once(config: &Config) -> anyhow::Result<ExitCode> {
    let mut orchestrator = Orchestrator::from_config(config, launcher(config))?;

    match orchestrator.run_cycle().await {
        CycleOutcome::Succeeded {
            path,
            partial,
            synced,
        } => {
            println!(
                "✓ Snapshot saved to {} (partial: {}, synced: {})",
                path.display(),
                partial,
                synced
            );
            Ok(ExitCode::SUCCESS)
        }
        CycleOutcome::Fatal { error } => {
            print_remediation(&error);
            Ok(ExitCode::FAILURE)
        }
        CycleOutcome::RetryScheduled { attempt, .. } => {
            eprintln!("Scrape failed on attempt {}; not retrying in --once mode", attempt);
            Ok(ExitCode::FAILURE)
        }
        CycleOutcome::GaveUp { error, .. } => {
            eprintln!("Scrape failed: {}", error);
            Ok(ExitCode::FAILURE)
        }
        CycleOutcome::Skipped { .. } => {
            eprintln!("Circuit breaker open, scrape skipped");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Handles the default mode: the scrape loop until a signal or fatal error
async fn handle_run(config: &Config) -> anyhow::Result<ExitCode> {
    let mut orchestrator = Orchestrator::from_config(config, launcher(config))?;

    match orchestrator.run(shutdown_signal()).await {
        RunExit::Shutdown => {
            tracing::info!("Stopped after {} cycles", orchestrator.run_count());
            Ok(ExitCode::SUCCESS)
        }
        RunExit::Fatal(error) => {
            print_remediation(&error);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

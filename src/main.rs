//! Trend-Relay main entry point
//!
//! This is the command-line interface for the trending-listing collector.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use trend_relay::app::App;
use trend_relay::config::{load_config_with_hash, Config};
use trend_relay::TaskType;

/// Trend-Relay: an adaptive trending-listing collector
///
/// Trend-Relay collects a ranked listing page on a calendar, filters the
/// listings, summarizes them through a chain of providers and writes the
/// result as JSON snapshots.
#[derive(Parser, Debug)]
#[command(name = "trend-relay")]
#[command(version)]
#[command(about = "An adaptive trending-listing collector", long_about = None)]
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

    /// Validate the configuration, print it and exit
    #[arg(long, conflicts_with_all = ["run", "daemon", "history"])]
    validate: bool,

    /// Run one task now and exit
    #[arg(long, value_name = "TASK", value_parser = ["daily", "weekly", "monthly"])]
    run: Option<String>,

    /// Run the scheduler until interrupted (default)
    #[arg(long, conflicts_with_all = ["run", "history"])]
    daemon: bool,

    /// Print the N most recent run outcomes and exit
    #[arg(long, value_name = "N", conflicts_with = "run")]
    history: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.validate {
        print_config(&config, &config_hash);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let app = App::from_config(&config, cancel.clone()).context("failed to start")?;

    if let Some(limit) = cli.history {
        return handle_history(&app, limit);
    }

    if let Some(task) = cli.run.as_deref() {
        let task: TaskType = task.parse().map_err(anyhow::Error::msg)?;
        return handle_run(&app, task, cancel).await;
    }

    if !cli.daemon {
        tracing::debug!("No mode given, running the scheduler");
    }
    handle_daemon(&app, cancel).await;
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence when set.
fn setup_logging(verbose: u8, quiet: bool) {
    let default_filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "trend_relay=info,warn",
            1 => "trend_relay=debug,info",
            2 => "trend_relay=trace,debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels `cancel` on Ctrl-C
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                cancel.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

fn print_config(config: &Config, hash: &str) {
    println!("=== Trend-Relay Configuration ===\n");
    println!("Hash: {}\n", hash);

    println!("User Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nCollection:");
    println!("  URL template: {}", config.collection.url_template);
    println!("  Endpoint key: {}", config.collection.endpoint_key);
    println!("  Max concurrent fetches: {}", config.fetcher.max_concurrent);
    println!("  Fetch retries: {}", config.fetcher.max_retries);
    println!(
        "  Pacing: {}ms initial, {}-{}ms range",
        config.rate_limit.initial_interval_ms,
        config.rate_limit.min_interval_ms,
        config.rate_limit.max_interval_ms
    );
    println!(
        "  robots.txt: {}",
        if config.robots.enabled { "honoured" } else { "ignored" }
    );

    if !config.subscription.keywords.is_empty() {
        println!("\nSubscription ({:?}):", config.subscription.match_mode);
        println!("  Keywords: {}", config.subscription.keywords.join(", "));
    }

    println!("\nEnrichment:");
    if config.enrichment.enabled {
        let chain: Vec<&str> = if config.enrichment.chain.is_empty() {
            config.enrichment.providers.iter().map(|p| p.id.as_str()).collect()
        } else {
            config.enrichment.chain.iter().map(String::as_str).collect()
        };
        println!("  Chain: {}", chain.join(" -> "));
        println!("  Retries per provider: {}", config.enrichment.max_retries);
        println!("  Timeout: {}s", config.enrichment.timeout_secs);
    } else {
        println!("  Disabled");
    }

    println!("\nSchedule (UTC{}):", config.scheduler.utc_offset);
    println!(
        "  daily:   {} {}",
        config.scheduler.daily.time,
        enabled_label(config.scheduler.daily.enabled)
    );
    println!(
        "  weekly:  {} {} {}",
        config.scheduler.weekly.weekday.as_deref().unwrap_or("?"),
        config.scheduler.weekly.time,
        enabled_label(config.scheduler.weekly.enabled)
    );
    println!(
        "  monthly: last day {} {}",
        config.scheduler.monthly.time,
        enabled_label(config.scheduler.monthly.enabled)
    );
    println!("  Job retries: {}", config.scheduler.max_retries);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Delivery: {}", config.output.delivery_dir);
    println!(
        "  Alerts: {}",
        config.alerting.webhook_url.as_deref().unwrap_or("log only")
    );

    println!("\n✓ Configuration is valid");
}

fn enabled_label(enabled: bool) -> &'static str {
    if enabled {
        ""
    } else {
        "(disabled)"
    }
}

fn handle_history(app: &App, limit: usize) -> anyhow::Result<()> {
    let outcomes = app.history(limit)?;
    if outcomes.is_empty() {
        println!("No runs recorded yet");
        return Ok(());
    }

    println!(
        "{:<8} {:<10} {:<26} {:<8} {:>8} {:>6} {:>5}  ERROR",
        "TASK", "TRIGGER", "STARTED", "STATUS", "ATTEMPTS", "FOUND", "KEPT"
    );
    for outcome in outcomes {
        println!(
            "{:<8} {:<10} {:<26} {:<8} {:>8} {:>6} {:>5}  {}",
            outcome.task_type,
            outcome.trigger.to_db_string(),
            outcome.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            outcome.status,
            outcome.attempts,
            outcome.items_found,
            outcome.items_kept,
            outcome.error_summary.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn handle_run(app: &App, task: TaskType, cancel: CancellationToken) -> anyhow::Result<()> {
    cancel_on_ctrl_c(cancel);

    let outcome = app.run_once(task).await?;
    println!(
        "{} run {}: {} found, {} kept, {} attempt(s)",
        outcome.task_type, outcome.status, outcome.items_found, outcome.items_kept, outcome.attempts
    );

    if outcome.status.is_failure() {
        anyhow::bail!(
            "{}",
            outcome
                .error_summary
                .unwrap_or_else(|| format!("{} run failed", task))
        );
    }
    Ok(())
}

async fn handle_daemon(app: &App, cancel: CancellationToken) {
    cancel_on_ctrl_c(cancel);
    app.run_daemon().await;
    tracing::info!("Shutdown complete");
}

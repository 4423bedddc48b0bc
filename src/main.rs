//! AfterhoursMonitor - Main Entry Point
//!
//! Runs one after-hours monitoring session against the backend and logs
//! phase changes, triggers and the final summary.

use afterhours_monitor::config::loader::load_config;
use afterhours_monitor::{MonitoringCoordinator, WatchTarget};
use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides settings.log_level
    #[arg(long)]
    log_level: Option<String>,

    /// JSON file with the watch-list to start monitoring
    #[arg(long)]
    watchlist: Option<String>,

    /// Disable the WebSocket push channel and rely on polling
    #[arg(long)]
    no_push: bool,
}

/// Watch-list file entry; `buy_threshold` falls back to the configured default
#[derive(Debug, Deserialize)]
struct WatchEntry {
    symbol: String,
    #[serde(default)]
    stock_name: String,
    entry_price: Decimal,
    #[serde(default)]
    buy_threshold: Option<Decimal>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let config = load_config(Some(&args.config)).context("failed to load configuration")?;

    // Initialize logging
    let level_name = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    let level = match level_name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    if config.settings.log_format.eq_ignore_ascii_case("json") {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!("Starting AfterhoursMonitor");
    info!("Configuration file: {}", args.config);
    info!(
        rest_url = %config.backend.rest_url,
        websocket_url = %config.backend.websocket_url,
        push = !args.no_push,
        "Backend endpoints"
    );

    let coordinator = MonitoringCoordinator::from_config(&config, !args.no_push)?;

    let bus = coordinator.notifications();
    bus.on_phase_change(|change| {
        info!("Phase {} -> {}", change.previous, change.next);
    });
    bus.on_target_triggered(|target| {
        info!(
            "{} ({}) triggered at {} ({}%)",
            target.symbol, target.stock_name, target.current_price, target.change_percent
        );
    });
    bus.on_session_complete(|stats| {
        info!(
            "Session complete: {}/{} triggered, success rate {}, average change {}%",
            stats.triggered_count,
            stats.total_targets,
            stats.success_rate,
            stats.average_change_percent
        );
    });

    if let Some(path) = &args.watchlist {
        let targets = read_watchlist(path, config.monitoring.default_buy_threshold)?;
        info!("Starting session for {} targets from {}", targets.len(), path);
        let message = coordinator.start(targets).await?;
        info!("{}", message);
    } else {
        match coordinator.refresh_status().await {
            Ok(session) => info!(
                running = session.is_running,
                phase = %session.current_phase,
                targets = session.total_targets,
                "Current backend session"
            ),
            Err(e) => warn!("Could not read backend status: {}", e),
        }
    }

    // Keep the application running
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");

    if let Err(e) = coordinator.stop().await {
        warn!("Failed to stop monitoring: {}", e);
    }
    coordinator.shutdown().await;

    Ok(())
}

fn read_watchlist(path: &str, default_threshold: Decimal) -> Result<Vec<WatchTarget>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read watch-list {}", path))?;
    let entries: Vec<WatchEntry> =
        serde_json::from_str(&raw).with_context(|| format!("invalid watch-list {}", path))?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            WatchTarget::new(
                entry.symbol,
                entry.stock_name,
                entry.entry_price,
                entry.buy_threshold.unwrap_or(default_threshold),
            )
        })
        .collect())
}

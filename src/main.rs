//! Batch Watchdog - background health checks with bounded recovery
//!
//! # Usage
//!
//! ```bash
//! # Run with ./watchdog.toml next to the executable
//! batch-watchdog
//!
//! # Use another config file (looked up next to the executable) and event source
//! batch-watchdog cbwatchdog.json "Custom Batch Watchdog"
//!
//! # Structured logs
//! batch-watchdog --log-format json
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::time::Duration;
use tracing::{info, warn};

use batch_watchdog::config::defaults;
use batch_watchdog::{Collaborators, StartupOverrides, WatchdogService};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "batch-watchdog")]
#[command(about = "Health-checks managed workloads and drives bounded recovery")]
#[command(version)]
struct CliArgs {
    /// Config file name, resolved next to the executable (`/` is stripped)
    config_file: Option<String>,

    /// Event source name attached to every log record (`/` is stripped)
    event_source: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "WATCHDOG_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

// ============================================================================
// Shutdown
// ============================================================================

/// Resolve when the host asks the process to stop.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
                    _ = term.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C");
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_format);

    let overrides = StartupOverrides {
        config_file: args.config_file,
        event_source: args.event_source,
    };

    let handle = WatchdogService::new(Collaborators::system())
        .start(&overrides)
        .context("Failed to start watchdog")?;

    shutdown_signal().await;
    handle.stop();

    let grace = Duration::from_secs(defaults::SHUTDOWN_GRACE_SECS);
    match tokio::time::timeout(grace, handle.join()).await {
        Ok(Ok(stats)) => info!(
            cycles = stats.cycles,
            recoveries = stats.recoveries_launched,
            exhaustions = stats.exhaustions,
            "Watchdog shutdown complete"
        ),
        Ok(Err(e)) => warn!("Watchdog task ended abnormally: {}", e),
        Err(_) => warn!(
            "Watchdog still finishing a recovery sequence after {}s, exiting anyway",
            grace.as_secs()
        ),
    }

    Ok(())
}

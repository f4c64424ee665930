//! Parlay - Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parlay_common::logging::{init_logging, LogConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parlay_server::{api, config::Config, scheduler, service::RefreshService};

#[derive(Parser, Debug)]
#[command(name = "parlay")]
#[command(author, version, about = "Incremental fantasy-points updater")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one refresh pass and exit
    Once {
        /// Event URL (defaults to EVENT_URL)
        #[arg(long)]
        event: Option<String>,
    },

    /// Run one full refresh (cleanup, every event, snapshot) and exit
    Daily {
        /// Event URLs (defaults to EVENT_URLS, then EVENT_URL)
        #[arg(long = "event")]
        events: Vec<String>,
    },

    /// Delete snapshot folders past the retention window and exit
    Cleanup,

    /// Serve the API and run the poller and daily loops
    Watch {
        /// Event URL for the poller (defaults to EVENT_URL)
        #[arg(long)]
        event: Option<String>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("parlay")
        .filter_directives("parlay_server=debug,parlay_ingest=info,tower_http=debug")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Once { event } => {
            let group = event.or_else(|| config.refresh.event_url.clone()).unwrap_or_default();
            if group.is_empty() {
                warn!("No event given (--event or EVENT_URL), nothing to do");
                return Ok(());
            }

            let service = RefreshService::from_config(&config)?;
            let report = service.refresh_once(&group).await?;
            info!(
                changed = report.changed,
                written = report.written.len(),
                skipped = report.skipped_entities,
                "Refresh finished"
            );
        },
        Command::Daily { events } => {
            let groups = if events.is_empty() {
                config.refresh.event_groups()
            } else {
                events
            };

            let service = RefreshService::from_config(&config)?;
            let report = service.full_refresh(&groups).await?;
            info!(
                changed = report.changed,
                files_written = report.written.len(),
                folders_deleted = report.cleanup.folders_deleted,
                bytes_reclaimed = report.cleanup.bytes_reclaimed,
                "Full refresh finished"
            );
        },
        Command::Cleanup => {
            let service = RefreshService::from_config(&config)?;
            let report = service.cleanup()?;
            info!(
                folders_deleted = report.folders_deleted,
                bytes_reclaimed = report.bytes_reclaimed,
                "Cleanup finished"
            );
        },
        Command::Watch { event, host, port } => {
            if let Some(event) = event {
                config.refresh.event_url = Some(event);
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            watch(config).await?;
        },
    }

    Ok(())
}

/// HTTP server plus both background loops, until Ctrl+C or SIGTERM
async fn watch(config: Config) -> Result<()> {
    let service = Arc::new(RefreshService::from_config(&config)?);
    let cancel = CancellationToken::new();
    let mut loops = Vec::new();

    match config.refresh.event_url.clone() {
        Some(group) => loops.push(tokio::spawn(scheduler::run_poller(
            service.clone(),
            group,
            Duration::from_secs(config.refresh.poll_seconds),
            cancel.clone(),
        ))),
        None => warn!("EVENT_URL not set, poller disabled"),
    }

    if config.schedule.daily_run {
        loops.push(tokio::spawn(scheduler::run_daily(
            service.clone(),
            config.refresh.event_groups(),
            config.schedule.run_at()?,
            config.schedule.tz()?,
            cancel.clone(),
        )));
    }

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    api::serve(&config, service, cancel.clone()).await?;

    // Loops stop at their next sleep boundary
    let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
    for handle in loops {
        if tokio::time::timeout(grace, handle).await.is_err() {
            warn!("Background loop did not stop within {} seconds", grace.as_secs());
        }
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

//! Parlay Ingest - inspect what the scraper sees for an event or a match

use anyhow::{Context, Result};
use clap::Parser;
use parlay_common::logging::{init_logging, LogConfig, LogLevel};
use parlay_ingest::http::{HttpClient, HttpClientConfig};
use parlay_ingest::source::{DiscoveredEntity, EntitySource};
use parlay_ingest::vlr::VlrSource;
use parlay_ingest::calc_score;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "parlay-ingest")]
#[command(author, version, about = "Parlay scraper debugging tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Concurrent requests against the remote site
    #[arg(long, env = "CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// List the matches of an event
    Discover {
        /// Event URL
        #[arg(short, long)]
        event: String,
    },

    /// Fetch one match and print its per-map rows as JSON
    Match {
        /// Match overview URL
        #[arg(short, long)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("parlay-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let http = HttpClient::new(HttpClientConfig {
        concurrency: cli.concurrency,
        ..Default::default()
    })?;
    let source = VlrSource::new(http)?;

    match cli.command {
        Command::Discover { event } => {
            let entities = source
                .discover(&event)
                .await
                .with_context(|| format!("Discovery failed for {}", event))?;

            for entity in &entities {
                info!(
                    id = %entity.id,
                    stage = entity.stage.as_deref().unwrap_or("-"),
                    url = %entity.url,
                    "Match"
                );
            }
            info!(total = entities.len(), "Discovery complete");
        },
        Command::Match { url } => {
            let entity = DiscoveredEntity::new(source.match_id_from_url(&url), url.clone());
            let raw = source
                .fetch(&entity)
                .await
                .with_context(|| format!("Fetch failed for {}", url))?;
            let rows = source.match_rows(&entity, &raw)?;

            for row in &rows {
                info!(player = %row.name, map = row.map_num, score = calc_score(row), "Row");
            }
            println!("{}", serde_json::to_string_pretty(&rows)?);
        },
    }

    Ok(())
}

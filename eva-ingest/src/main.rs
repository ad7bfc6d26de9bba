//! eva-ingest - Ingestion Conductor
//!
//! Polls configured community feeds on a wall-clock interval and delivers
//! each post envelope to the admission endpoint. Idempotent: duplicates are
//! deduped by the endpoint, so crashes mid-cycle are safe to restart.

use anyhow::Result;
use clap::Parser;
use eva_ingest::admission::AdmissionClient;
use eva_ingest::conductor::Conductor;
use eva_ingest::feed::FeedClient;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Ingest community text posts into EVA-Finance
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma-separated list of communities to poll
    #[arg(long, value_delimiter = ',', default_value = "BuyItForLife,Frugal,running")]
    communities: Vec<String>,

    /// Posts to fetch per community per cycle
    #[arg(long, default_value_t = 25)]
    limit: usize,

    /// Seconds to pause between feed requests
    #[arg(long, default_value_t = 2)]
    pace_secs: u64,

    /// Minutes between cycles
    #[arg(long, default_value_t = 15)]
    interval_mins: u64,

    /// Run one cycle and exit
    #[arg(long)]
    once: bool,

    /// Admission endpoint URL
    #[arg(long, env = "EVA_API_URL", default_value = "http://127.0.0.1:9080/intake/message")]
    api_url: String,

    /// Feed base URL override (for testing)
    #[arg(long)]
    feed_base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("eva_ingest={log_level}").into()),
        )
        .init();

    if args.communities.is_empty() {
        anyhow::bail!("No communities specified");
    }

    info!(
        "Starting eva-ingest v{}: {} communities, limit {}, every {} min",
        env!("CARGO_PKG_VERSION"),
        args.communities.len(),
        args.limit,
        args.interval_mins
    );

    let feed = FeedClient::new(args.feed_base_url.clone(), Duration::from_secs(args.pace_secs))?;
    let admission = AdmissionClient::new(args.api_url.clone())?;
    let conductor = Conductor::new(args.communities.clone(), args.limit, feed, admission);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                shutdown.cancel();
            }
        });
    }

    loop {
        let stats = conductor.run_cycle().await;

        if args.once {
            // Non-zero exit when delivery failed, for cron-style operation.
            if stats.posts_failed > 0 {
                std::process::exit(1);
            }
            return Ok(());
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Conductor stopped");
                return Ok(());
            }
            _ = tokio::time::sleep(Duration::from_secs(args.interval_mins * 60)) => {}
        }
    }
}

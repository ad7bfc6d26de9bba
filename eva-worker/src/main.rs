//! eva-worker - Signal Pipeline Worker
//!
//! Runs the long-lived pipeline loop: claim and extract raw posts, emit
//! trigger events, build recommendation drafts, and poll the notifier.
//! Scoring and the paper-position loop run on their own timers within the
//! same process. Multiple workers may run concurrently; every write is
//! either claimed atomically or idempotent by unique key.

use anyhow::Result;
use chrono::{Datelike, Utc};
use eva_common::config::Settings;
use eva_worker::brands::BrandMapper;
use eva_worker::extract::{ExtractionStrategy, LlmExtractor};
use eva_worker::extractor::Extractor;
use eva_worker::notify::Notifier;
use eva_worker::paper::{PaperTrader, QuoteClient};
use eva_worker::reco::RecommendationBuilder;
use eva_worker::scoring::runner::Scorer;
use eva_worker::trends::TrendsValidator;
use eva_worker::triggers::TriggerEmitter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting eva-worker v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    let pool = eva_common::db::connect(
        &settings.database.path,
        settings.database.pool_min,
        settings.database.pool_max,
    )
    .await?;
    info!("Database connection established");

    let llm = LlmExtractor::from_settings(&settings.llm)?;
    match &llm {
        Some(extractor) => info!(version = extractor.version(), "Model-backed extraction enabled"),
        None => info!("No model provider configured; extraction is heuristic-only"),
    }
    let extractor = Extractor::new(
        pool.clone(),
        ExtractionStrategy::new(llm),
        settings.worker.batch_size,
    );

    let triggers = TriggerEmitter::new(pool.clone());

    let validator = settings
        .trends
        .enabled
        .then(|| Arc::new(TrendsValidator::new(settings.trends.clone())));
    let scorer = Scorer::new(pool.clone(), settings.clone(), validator);

    let reco = RecommendationBuilder::new(pool.clone(), settings.worker.reco_output_dir.clone());
    let notifier = Notifier::new(pool.clone(), settings.notify.clone())?;
    let mapper = BrandMapper::new(pool.clone(), settings.market.clone())?;
    let trader = PaperTrader::new(pool.clone(), QuoteClient::new(settings.market.clone())?);

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

    let notify_interval = Duration::from_secs(settings.notify.poll_interval_secs);
    let scoring_interval = Duration::from_secs(settings.scoring.interval_hours * 3600);
    let paper_interval = Duration::from_secs(24 * 3600);
    let idle_sleep = Duration::from_secs(settings.worker.idle_sleep_secs);

    let mut last_notify_poll: Option<Instant> = None;
    let mut last_score_run: Option<Instant> = None;
    let mut last_paper_run: Option<Instant> = None;

    info!("Worker loop started");

    while !shutdown.is_cancelled() {
        let today = Utc::now().date_naive();

        let extracted = match extractor.process_batch().await {
            Ok(n) => {
                if n > 0 {
                    info!(processed = n, "Extraction batch complete");
                }
                n
            }
            Err(e) => {
                error!(error = %e, "Extraction batch failed");
                0
            }
        };

        if let Err(e) = triggers.run(today).await {
            error!(error = %e, "Trigger emission failed");
        }

        match reco.build_pending().await {
            Ok(n) if n > 0 => info!(drafts = n, "Registered recommendation drafts"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Draft building failed"),
        }

        if due(last_notify_poll, notify_interval) {
            match notifier.poll_and_notify().await {
                Ok(stats) if stats.sent > 0 || stats.failed > 0 => {
                    info!(sent = stats.sent, failed = stats.failed, "Notification poll");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Notification poll failed"),
            }
            last_notify_poll = Some(Instant::now());
        }

        if due(last_score_run, scoring_interval) {
            match scorer.run(today).await {
                Ok(stats) => info!(
                    scored = stats.scored,
                    eligible = stats.eligible_events,
                    warm = stats.warm_events,
                    pending_validations = stats.validations_pending,
                    "Scoring run"
                ),
                Err(e) => error!(error = %e, "Scoring run failed"),
            }
            last_score_run = Some(Instant::now());
        }

        // Position upkeep runs on weekdays only; markets are closed otherwise.
        let weekday = !matches!(today.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun);
        if weekday && due(last_paper_run, paper_interval) {
            match trader.open_pending(&mapper, today).await {
                Ok(stats) if stats.opened > 0 || stats.skipped > 0 => {
                    info!(opened = stats.opened, skipped = stats.skipped, "Paper entries");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Paper entry failed"),
            }
            match trader.update_open_positions(today).await {
                Ok(stats) if stats.refreshed > 0 => {
                    info!(refreshed = stats.refreshed, closed = stats.closed, "Paper update");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Paper update failed"),
            }
            last_paper_run = Some(Instant::now());
        }

        if extracted == 0 {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(idle_sleep) => {}
            }
        }
    }

    info!("Worker stopped");
    Ok(())
}

fn due(last: Option<Instant>, interval: Duration) -> bool {
    match last {
        None => true,
        Some(at) => at.elapsed() >= interval,
    }
}

//! evactl - Operator CLI
//!
//! Small and boring: the handful of interventions the pipeline cannot make
//! on its own. Exit codes: 0 success, 1 user error, 2 store error,
//! 3 external provider error.

use chrono::Utc;
use clap::{Parser, Subcommand};
use eva_common::config::Settings;
use eva_common::db::models::ExitReason;
use eva_common::Error;
use eva_worker::brands::BrandMapper;
use eva_worker::paper::{PaperTrader, QuoteClient};
use eva_worker::scoring::runner::Scorer;
use eva_worker::trends::TrendsValidator;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "EVA-Finance operator tools", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List brands seen in signals that have no ticker mapping
    ListUnmappedBrands,

    /// Map a brand to a ticker by hand
    MapBrand {
        brand: String,
        ticker: String,
        /// Brand represents >5% of parent revenue
        #[arg(long)]
        material: bool,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        exchange: Option<String>,
    },

    /// Run one scoring pass immediately
    ScoreNow,

    /// Run the search-interest validator for one brand
    ValidateBrand { brand: String },

    /// Reset a poison draft's notification attempts
    ResetRetries { draft_id: i64 },

    /// Approve a recommendation draft
    ApproveDraft {
        draft_id: i64,
        #[arg(long)]
        approver: String,
    },

    /// Manually close a paper position at a given price
    ClosePosition {
        position_id: i64,
        #[arg(long)]
        price: f64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    std::process::exit(run(args).await);
}

async fn run(args: Args) -> i32 {
    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return 1;
        }
    };

    let pool = match eva_common::db::connect(
        &settings.database.path,
        settings.database.pool_min,
        settings.database.pool_max,
    )
    .await
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("store error: {e}");
            return 2;
        }
    };

    match execute(args.command, pool, settings).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(e: &Error) -> i32 {
    match e {
        Error::InvalidInput(_) | Error::NotFound(_) | Error::Config(_) => 1,
        Error::Database(_) | Error::Io(_) => 2,
        Error::Http(_) | Error::Provider { .. } | Error::RateLimited { .. } => 3,
        Error::Internal(_) => 2,
    }
}

async fn execute(command: Command, pool: SqlitePool, settings: Settings) -> Result<(), Error> {
    match command {
        Command::ListUnmappedBrands => {
            let mapper = BrandMapper::new(pool, settings.market.clone())?;
            let unmapped = mapper.list_unmapped().await?;
            if unmapped.is_empty() {
                println!("All signal brands are mapped.");
            } else {
                for brand in unmapped {
                    println!("{brand}");
                }
            }
            Ok(())
        }

        Command::MapBrand {
            brand,
            ticker,
            material,
            parent,
            exchange,
        } => {
            if brand.trim().is_empty() || ticker.trim().is_empty() {
                return Err(Error::InvalidInput("brand and ticker must not be empty".into()));
            }
            let mapper = BrandMapper::new(pool, settings.market.clone())?;
            mapper
                .map_brand(
                    &brand,
                    Some(ticker.trim()),
                    material,
                    parent.as_deref(),
                    exchange.as_deref(),
                )
                .await?;
            println!("Mapped {brand} -> {} (material: {material})", ticker.trim());
            Ok(())
        }

        Command::ScoreNow => {
            let validator = settings
                .trends
                .enabled
                .then(|| Arc::new(TrendsValidator::new(settings.trends.clone())));
            let scorer = Scorer::new(pool, settings.clone(), validator);
            let stats = scorer.run(Utc::now().date_naive()).await?;
            println!(
                "Scored {} of {} candidates ({} eligible, {} warm, {} validations pending)",
                stats.scored,
                stats.candidates,
                stats.eligible_events,
                stats.warm_events,
                stats.validations_pending
            );
            Ok(())
        }

        Command::ValidateBrand { brand } => {
            if brand.trim().is_empty() {
                return Err(Error::InvalidInput("brand must not be empty".into()));
            }
            let validator = TrendsValidator::new(settings.trends.clone());
            let outcome = validator.validate_brand(&brand).await;
            println!("brand:            {brand}");
            println!("status:           {}", outcome.status.as_str());
            println!("search interest:  {:.4}", outcome.search_interest);
            println!("trend direction:  {}", outcome.direction.as_str());
            println!("validates signal: {}", outcome.validates_signal);
            println!("confidence boost: {:+.4}", outcome.confidence_boost);
            if let Some(error) = &outcome.error {
                println!("error:            {error}");
                return Err(Error::Provider {
                    provider: "trends",
                    status: 0,
                    message: error.clone(),
                });
            }
            Ok(())
        }

        Command::ResetRetries { draft_id } => {
            let result = sqlx::query(
                r#"
                UPDATE recommendation_drafts
                SET notify_attempts = 0,
                    last_notify_error = NULL,
                    claimed_at = NULL
                WHERE id = ? AND notified_at IS NULL
                "#,
            )
            .bind(draft_id)
            .execute(&pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(Error::NotFound(format!(
                    "draft {draft_id} (or already notified)"
                )));
            }
            println!("Reset notification attempts for draft {draft_id}");
            Ok(())
        }

        Command::ApproveDraft { draft_id, approver } => {
            if approver.trim().is_empty() {
                return Err(Error::InvalidInput("approver must not be empty".into()));
            }
            let result = sqlx::query(
                r#"
                UPDATE recommendation_drafts
                SET approved = 1,
                    approved_by = ?,
                    approved_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                WHERE id = ?
                "#,
            )
            .bind(approver.trim())
            .bind(draft_id)
            .execute(&pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(Error::NotFound(format!("draft {draft_id}")));
            }
            println!("Approved draft {draft_id} as {}", approver.trim());
            Ok(())
        }

        Command::ClosePosition { position_id, price } => {
            if price <= 0.0 {
                return Err(Error::InvalidInput("price must be positive".into()));
            }
            let trader = PaperTrader::new(pool, QuoteClient::new(settings.market.clone())?);
            let closed = trader
                .close_position(position_id, price, ExitReason::Manual, Utc::now().date_naive())
                .await?;
            if !closed {
                return Err(Error::NotFound(format!(
                    "open position {position_id}"
                )));
            }
            println!("Closed position {position_id} at {price}");
            Ok(())
        }
    }
}

//! Paper-position lifecycle
//!
//! Simulates a fixed-size position per approved eligible signal, for
//! validation only: entry when a signal's brand resolves to a material
//! ticker, daily price refresh, and rule-based exits. No orders are ever
//! placed anywhere.

use crate::brands::{BrandMapper, MappingStatus};
use chrono::NaiveDate;
use eva_common::config::MarketSettings;
use eva_common::db::models::{EventKind, ExitReason, PaperPosition};
use eva_common::Result;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Simulated dollars per position.
const POSITION_SIZE: f64 = 1000.0;
/// Exit rules.
const MAX_HOLD_DAYS: i64 = 90;
const PROFIT_TARGET_PCT: f64 = 0.15;
const STOP_LOSS_PCT: f64 = -0.10;

#[derive(Debug, Default, Clone, Copy)]
pub struct PaperStats {
    pub opened: usize,
    pub skipped: usize,
    pub refreshed: usize,
    pub closed: usize,
}

/// Market quote client. Provider returns an array of quote objects; only
/// the price is read.
pub struct QuoteClient {
    http_client: reqwest::Client,
    cfg: MarketSettings,
    last_request: Mutex<Option<Instant>>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    price: f64,
}

impl QuoteClient {
    pub fn new(cfg: MarketSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            cfg,
            last_request: Mutex::new(None),
        })
    }

    /// Current price for a ticker, or None when the provider has nothing.
    pub async fn current_price(&self, ticker: &str) -> Result<Option<f64>> {
        let Some(api_key) = &self.cfg.api_key else {
            tracing::debug!("No market API key configured; quotes disabled");
            return Ok(None);
        };

        {
            let mut last = self.last_request.lock().await;
            if let Some(last_time) = *last {
                let min_interval = Duration::from_millis(self.cfg.rate_limit_ms);
                let elapsed = last_time.elapsed();
                if elapsed < min_interval {
                    tokio::time::sleep(min_interval - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        let url = format!(
            "{}/quote/{}",
            self.cfg.base_url.trim_end_matches('/'),
            ticker
        );
        let response = self
            .http_client
            .get(&url)
            .query(&[("apikey", api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(ticker, status = %response.status(), "Quote fetch failed");
            return Ok(None);
        }

        let quotes: Vec<Quote> = response.json().await.unwrap_or_default();
        Ok(quotes.first().map(|q| q.price))
    }
}

pub struct PaperTrader {
    db: SqlitePool,
    quotes: QuoteClient,
}

impl PaperTrader {
    pub fn new(db: SqlitePool, quotes: QuoteClient) -> Self {
        Self { db, quotes }
    }

    /// Open positions for eligible events that don't have one yet and whose
    /// brand resolves to a material, tradable ticker.
    pub async fn open_pending(&self, mapper: &BrandMapper, today: NaiveDate) -> Result<PaperStats> {
        let mut stats = PaperStats::default();

        #[derive(sqlx::FromRow)]
        struct PendingSignal {
            id: i64,
            brand: String,
            tag: String,
        }

        let pending = sqlx::query_as::<_, PendingSignal>(
            r#"
            SELECT se.id, se.brand, se.tag
            FROM signal_events se
            LEFT JOIN paper_positions pp ON pp.signal_event_id = se.id
            WHERE se.kind = ? AND se.brand <> '' AND pp.id IS NULL
            ORDER BY se.day DESC
            "#,
        )
        .bind(EventKind::RecommendationEligible.as_str())
        .fetch_all(&self.db)
        .await?;

        if pending.is_empty() {
            return Ok(stats);
        }

        tracing::info!(pending = pending.len(), "Signals pending paper entry");

        for signal in pending {
            // Unseen brands get one provider lookup before being skipped.
            let mut mapping = mapper.lookup(&signal.brand).await?;
            if mapping.is_none() {
                let attempt = mapper.ensure_mapped(&signal.brand).await?;
                if attempt.status == MappingStatus::Mapped {
                    mapping = mapper.lookup(&signal.brand).await?;
                }
            }

            let Some(mapping) = mapping else {
                tracing::info!(brand = %signal.brand, "Skipping entry: brand unmapped");
                stats.skipped += 1;
                continue;
            };
            let Some(ticker) = mapping.ticker.clone() else {
                tracing::info!(brand = %signal.brand, "Skipping entry: no public ticker");
                stats.skipped += 1;
                continue;
            };
            if !mapping.material {
                tracing::info!(
                    brand = %signal.brand,
                    ticker = %ticker,
                    "Skipping entry: brand not material to parent"
                );
                stats.skipped += 1;
                continue;
            }

            let Some(entry_price) = self.quotes.current_price(&ticker).await? else {
                tracing::warn!(brand = %signal.brand, ticker = %ticker, "Skipping entry: price unavailable");
                stats.skipped += 1;
                continue;
            };

            let result = sqlx::query(
                r#"
                INSERT INTO paper_positions
                    (signal_event_id, brand, tag, ticker, entry_date, entry_price,
                     current_price, position_size, status)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'open')
                ON CONFLICT (signal_event_id) DO NOTHING
                "#,
            )
            .bind(signal.id)
            .bind(&signal.brand)
            .bind(&signal.tag)
            .bind(&ticker)
            .bind(today.format("%Y-%m-%d").to_string())
            .bind(entry_price)
            .bind(entry_price)
            .bind(POSITION_SIZE)
            .execute(&self.db)
            .await?;

            if result.rows_affected() > 0 {
                stats.opened += 1;
                tracing::info!(
                    brand = %signal.brand,
                    ticker = %ticker,
                    entry_price,
                    "Opened paper position"
                );
            }
        }

        Ok(stats)
    }

    /// Refresh prices and returns for open positions, then apply exit rules.
    pub async fn update_open_positions(&self, today: NaiveDate) -> Result<PaperStats> {
        let mut stats = PaperStats::default();
        let today_str = today.format("%Y-%m-%d").to_string();

        let open = sqlx::query_as::<_, PaperPosition>(
            r#"
            SELECT id, signal_event_id, brand, tag, ticker, entry_date, entry_price,
                   current_price, position_size, status, exit_date, exit_price,
                   exit_reason, return_pct, return_dollar, days_held
            FROM paper_positions
            WHERE status = 'open'
            ORDER BY entry_date ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        for position in open {
            let Some(price) = self.quotes.current_price(&position.ticker).await? else {
                tracing::warn!(ticker = %position.ticker, "Price unavailable for update");
                continue;
            };

            let return_pct = (price - position.entry_price) / position.entry_price;
            let return_dollar = return_pct * position.position_size;
            let days_held = days_between(&position.entry_date, &today_str);

            sqlx::query(
                r#"
                UPDATE paper_positions
                SET current_price = ?,
                    return_pct = ?,
                    return_dollar = ?,
                    days_held = ?,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                WHERE id = ? AND status = 'open'
                "#,
            )
            .bind(price)
            .bind(return_pct)
            .bind(return_dollar)
            .bind(days_held)
            .bind(position.id)
            .execute(&self.db)
            .await?;
            stats.refreshed += 1;

            if let Some(reason) = evaluate_exit(days_held, return_pct) {
                if self.close_position(position.id, price, reason, today).await? {
                    stats.closed += 1;
                    tracing::info!(
                        position_id = position.id,
                        ticker = %position.ticker,
                        return_pct,
                        days_held,
                        reason = reason.as_str(),
                        "Closed paper position"
                    );
                }
            }
        }

        Ok(stats)
    }

    /// Close one position; all exit fields are set in the same statement as
    /// the status transition.
    pub async fn close_position(
        &self,
        position_id: i64,
        exit_price: f64,
        reason: ExitReason,
        exit_date: NaiveDate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE paper_positions
            SET status = 'closed',
                exit_date = ?,
                exit_price = ?,
                exit_reason = ?,
                current_price = ?,
                return_pct = (? - entry_price) / entry_price,
                return_dollar = (? - entry_price) / entry_price * position_size,
                days_held = MAX(0, CAST(julianday(?) - julianday(entry_date) AS INTEGER)),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ? AND status = 'open'
            "#,
        )
        .bind(exit_date.format("%Y-%m-%d").to_string())
        .bind(exit_price)
        .bind(reason.as_str())
        .bind(exit_price)
        .bind(exit_price)
        .bind(exit_price)
        .bind(exit_date.format("%Y-%m-%d").to_string())
        .bind(position_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Which exit rule applies, if any. Time exit is checked first so a stale
/// position leaves the book even when its return also crosses a threshold;
/// exactly one reason ever applies.
pub fn evaluate_exit(days_held: i64, return_pct: f64) -> Option<ExitReason> {
    if days_held >= MAX_HOLD_DAYS {
        return Some(ExitReason::TimeExit);
    }
    if return_pct >= PROFIT_TARGET_PCT {
        return Some(ExitReason::ProfitTarget);
    }
    if return_pct <= STOP_LOSS_PCT {
        return Some(ExitReason::StopLoss);
    }
    None
}

fn days_between(entry_date: &str, today: &str) -> i64 {
    match (
        NaiveDate::parse_from_str(entry_date, "%Y-%m-%d"),
        NaiveDate::parse_from_str(today, "%Y-%m-%d"),
    ) {
        (Ok(entry), Ok(today)) => (today - entry).num_days().max(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profit_target_closes_at_fifteen_percent() {
        // Entry 2.33, current 2.70: return ~= 15.88%.
        let return_pct = (2.70 - 2.33) / 2.33;
        assert!(return_pct >= PROFIT_TARGET_PCT);
        assert_eq!(evaluate_exit(10, return_pct), Some(ExitReason::ProfitTarget));

        let return_dollar = return_pct * POSITION_SIZE;
        assert!((return_dollar - 158.80).abs() < 1.0);
    }

    #[test]
    fn stop_loss_closes_at_minus_ten_percent() {
        assert_eq!(evaluate_exit(10, -0.10), Some(ExitReason::StopLoss));
        assert_eq!(evaluate_exit(10, -0.0999), None);
    }

    #[test]
    fn time_exit_takes_precedence() {
        assert_eq!(evaluate_exit(90, 0.20), Some(ExitReason::TimeExit));
        assert_eq!(evaluate_exit(90, -0.20), Some(ExitReason::TimeExit));
        assert_eq!(evaluate_exit(90, 0.0), Some(ExitReason::TimeExit));
    }

    #[test]
    fn small_moves_hold() {
        assert_eq!(evaluate_exit(30, 0.05), None);
        assert_eq!(evaluate_exit(30, -0.05), None);
        assert_eq!(evaluate_exit(30, 0.1499), None);
    }

    #[test]
    fn days_between_is_non_negative() {
        assert_eq!(days_between("2026-07-01", "2026-07-11"), 10);
        assert_eq!(days_between("2026-07-11", "2026-07-01"), 0);
        assert_eq!(days_between("garbage", "2026-07-01"), 0);
    }
}

//! Integration tests for the paper-position lifecycle
//!
//! Quote fetching is disabled (no API key), so entry paths that need live
//! prices are exercised through their skip behavior and closes are driven
//! directly.

use chrono::NaiveDate;
use eva_common::config::MarketSettings;
use eva_common::db::models::ExitReason;
use eva_worker::brands::BrandMapper;
use eva_worker::paper::{PaperTrader, QuoteClient};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

fn market_settings() -> MarketSettings {
    MarketSettings {
        base_url: "http://127.0.0.1:1".to_string(),
        api_key: None,
        rate_limit_ms: 0,
    }
}

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    eva_common::db::init::init_schema(&pool).await.unwrap();
    pool
}

async fn seed_event(pool: &SqlitePool, brand: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO signal_events (kind, tag, brand, day, severity)
        VALUES ('RECOMMENDATION_ELIGIBLE', 'comfort', ?, '2026-07-01', 'critical')
        RETURNING id
        "#,
    )
    .bind(brand)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

async fn seed_mapping(pool: &SqlitePool, brand: &str, ticker: Option<&str>, material: bool) {
    sqlx::query(
        "INSERT INTO brand_ticker_map (brand, ticker, material) VALUES (?, ?, ?)",
    )
    .bind(brand)
    .bind(ticker)
    .bind(material)
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_open_position(pool: &SqlitePool, event_id: i64, entry_price: f64) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO paper_positions
            (signal_event_id, brand, tag, ticker, entry_date, entry_price,
             current_price, position_size, status)
        VALUES (?, 'Hoka', 'comfort', 'DECK', '2026-07-01', ?, ?, 1000.0, 'open')
        RETURNING id
        "#,
    )
    .bind(event_id)
    .bind(entry_price)
    .bind(entry_price)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[tokio::test]
async fn entry_skips_unmapped_immaterial_and_unpriced_brands() {
    let pool = test_pool().await;

    seed_event(&pool, "UnmappedBrand").await;

    seed_event(&pool, "PrivateBrand").await;
    seed_mapping(&pool, "PrivateBrand", None, false).await;

    seed_event(&pool, "SubsidiaryBrand").await;
    seed_mapping(&pool, "SubsidiaryBrand", Some("PARENT"), false).await;

    // Material and mapped, but quotes are disabled: price unavailable.
    seed_event(&pool, "Crocs").await;
    seed_mapping(&pool, "Crocs", Some("CROX"), true).await;

    let mapper = BrandMapper::new(pool.clone(), market_settings()).unwrap();
    let trader = PaperTrader::new(pool.clone(), QuoteClient::new(market_settings()).unwrap());

    let stats = trader.open_pending(&mapper, day("2026-07-02")).await.unwrap();
    assert_eq!(stats.opened, 0);
    assert_eq!(stats.skipped, 4);

    let (positions,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM paper_positions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(positions, 0);
}

#[tokio::test]
async fn profit_target_close_sets_all_exit_fields() {
    let pool = test_pool().await;
    let event_id = seed_event(&pool, "Hoka").await;
    let position_id = seed_open_position(&pool, event_id, 2.33).await;

    let trader = PaperTrader::new(pool.clone(), QuoteClient::new(market_settings()).unwrap());
    let closed = trader
        .close_position(position_id, 2.70, ExitReason::ProfitTarget, day("2026-07-11"))
        .await
        .unwrap();
    assert!(closed);

    let (status, exit_date, exit_price, exit_reason, return_pct, return_dollar, days_held): (
        String,
        Option<String>,
        Option<f64>,
        Option<String>,
        Option<f64>,
        Option<f64>,
        i64,
    ) = sqlx::query_as(
        r#"
        SELECT status, exit_date, exit_price, exit_reason, return_pct, return_dollar, days_held
        FROM paper_positions WHERE id = ?
        "#,
    )
    .bind(position_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!(status, "closed");
    assert_eq!(exit_date.as_deref(), Some("2026-07-11"));
    assert_eq!(exit_price, Some(2.70));
    assert_eq!(exit_reason.as_deref(), Some("profit_target"));

    let pct = return_pct.unwrap();
    assert!((pct - 0.1588).abs() < 0.001, "(2.70 - 2.33) / 2.33 ~= 0.1588");
    let dollars = return_dollar.unwrap();
    assert!((dollars - 158.8).abs() < 1.0);
    assert_eq!(days_held, 10);
}

#[tokio::test]
async fn closed_positions_cannot_close_again() {
    let pool = test_pool().await;
    let event_id = seed_event(&pool, "Hoka").await;
    let position_id = seed_open_position(&pool, event_id, 10.0).await;

    let trader = PaperTrader::new(pool.clone(), QuoteClient::new(market_settings()).unwrap());
    assert!(trader
        .close_position(position_id, 9.0, ExitReason::StopLoss, day("2026-07-11"))
        .await
        .unwrap());
    assert!(!trader
        .close_position(position_id, 12.0, ExitReason::Manual, day("2026-07-12"))
        .await
        .unwrap());

    // Exactly one exit reason, and exit_date >= entry_date.
    let (reason, entry_date, exit_date): (Option<String>, String, Option<String>) =
        sqlx::query_as(
            "SELECT exit_reason, entry_date, exit_date FROM paper_positions WHERE id = ?",
        )
        .bind(position_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(reason.as_deref(), Some("stop_loss"));
    assert!(exit_date.unwrap().as_str() >= entry_date.as_str());
}

#[tokio::test]
async fn one_position_per_signal_event() {
    let pool = test_pool().await;
    let event_id = seed_event(&pool, "Hoka").await;
    seed_open_position(&pool, event_id, 10.0).await;

    // A second insert for the same event conflicts away.
    let result = sqlx::query(
        r#"
        INSERT INTO paper_positions
            (signal_event_id, brand, tag, ticker, entry_date, entry_price, position_size, status)
        VALUES (?, 'Hoka', 'comfort', 'DECK', '2026-07-02', 11.0, 1000.0, 'open')
        ON CONFLICT (signal_event_id) DO NOTHING
        "#,
    )
    .bind(event_id)
    .execute(&pool)
    .await
    .unwrap();
    assert_eq!(result.rows_affected(), 0);
}

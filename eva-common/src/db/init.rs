//! Schema initialization
//!
//! Every table carries the unique keys that make the pipeline's writes
//! idempotent: raw posts dedupe on `(source, platform_id)`, processed rows
//! on `raw_id`, signal events on `(kind, tag, brand, day)`, confidence rows
//! on `(day, brand, tag, scoring_version)`, drafts and positions on their
//! triggering event.

use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Create all tables if they don't exist. Safe to call from every service.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_raw_posts_table(pool).await?;
    create_processed_posts_table(pool).await?;
    create_behavior_states_table(pool).await?;
    create_signal_events_table(pool).await?;
    create_confidence_scores_table(pool).await?;
    create_recommendation_drafts_table(pool).await?;
    create_brand_ticker_map_table(pool).await?;
    create_paper_positions_table(pool).await?;
    create_trends_validations_table(pool).await?;

    info!("Database schema initialized");
    Ok(())
}

async fn create_raw_posts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            platform_id TEXT NOT NULL,
            posted_at TEXT NOT NULL,
            body TEXT NOT NULL,
            url TEXT,
            meta TEXT NOT NULL DEFAULT '{}',
            processed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            UNIQUE (source, platform_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_raw_posts_unprocessed ON raw_posts (processed, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_processed_posts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processed_posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            raw_id INTEGER NOT NULL UNIQUE REFERENCES raw_posts(id),
            brands TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            sentiment TEXT NOT NULL DEFAULT 'neutral',
            intent TEXT NOT NULL DEFAULT 'none',
            tickers TEXT NOT NULL DEFAULT '[]',
            processor_version TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_behavior_states_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS behavior_states (
            tag TEXT PRIMARY KEY,
            state TEXT NOT NULL DEFAULT 'NORMAL',
            confidence REAL NOT NULL DEFAULT 0.0,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_signal_events_table(pool: &SqlitePool) -> Result<()> {
    // tag/brand default to '' rather than NULL so the dedup key holds:
    // SQLite treats NULLs as distinct in unique indexes.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signal_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            tag TEXT NOT NULL DEFAULT '',
            brand TEXT NOT NULL DEFAULT '',
            day TEXT NOT NULL,
            severity TEXT NOT NULL DEFAULT 'info',
            payload TEXT NOT NULL DEFAULT '{}',
            acknowledged INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            UNIQUE (kind, tag, brand, day)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_confidence_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS confidence_scores (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            day TEXT NOT NULL,
            brand TEXT NOT NULL,
            tag TEXT NOT NULL,
            scoring_version TEXT NOT NULL,
            acceleration_score REAL NOT NULL,
            intent_score REAL NOT NULL,
            spread_score REAL NOT NULL,
            baseline_score REAL NOT NULL,
            suppression_score REAL NOT NULL,
            final_confidence REAL NOT NULL,
            band TEXT NOT NULL,
            gate_failed_reason TEXT,
            details TEXT NOT NULL DEFAULT '{}',
            computed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            UNIQUE (day, brand, tag, scoring_version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_recommendation_drafts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recommendation_drafts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            signal_event_id INTEGER NOT NULL UNIQUE REFERENCES signal_events(id),
            brand TEXT NOT NULL,
            tag TEXT NOT NULL,
            event_time TEXT NOT NULL,
            final_confidence REAL,
            band TEXT,
            bundle_path TEXT NOT NULL,
            bundle_sha256 TEXT NOT NULL,
            markdown_path TEXT NOT NULL,
            markdown_sha256 TEXT NOT NULL,
            approved INTEGER NOT NULL DEFAULT 0,
            approved_by TEXT,
            approved_at TEXT,
            notified_at TEXT,
            claimed_at TEXT,
            notify_attempts INTEGER NOT NULL DEFAULT 0,
            last_notify_error TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_brand_ticker_map_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS brand_ticker_map (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            brand TEXT NOT NULL UNIQUE COLLATE NOCASE,
            ticker TEXT,
            parent_company TEXT,
            material INTEGER NOT NULL DEFAULT 0,
            exchange TEXT,
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_paper_positions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS paper_positions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            signal_event_id INTEGER NOT NULL UNIQUE REFERENCES signal_events(id),
            brand TEXT NOT NULL,
            tag TEXT NOT NULL,
            ticker TEXT NOT NULL,
            entry_date TEXT NOT NULL,
            entry_price REAL NOT NULL,
            current_price REAL,
            position_size REAL NOT NULL DEFAULT 1000.0,
            status TEXT NOT NULL DEFAULT 'open',
            exit_date TEXT,
            exit_price REAL,
            exit_reason TEXT,
            return_pct REAL,
            return_dollar REAL,
            days_held INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_trends_validations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trends_validations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            brand TEXT NOT NULL,
            checked_at TEXT NOT NULL,
            search_interest REAL NOT NULL DEFAULT 0.0,
            trend_direction TEXT NOT NULL DEFAULT 'unknown',
            validates_signal INTEGER NOT NULL DEFAULT 0,
            confidence_boost REAL NOT NULL DEFAULT 0.0,
            validation_status TEXT NOT NULL DEFAULT 'completed',
            query_term TEXT NOT NULL,
            error TEXT,
            raw TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

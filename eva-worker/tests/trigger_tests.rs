//! Integration tests for behavior states and trigger emission

use eva_worker::triggers::TriggerEmitter;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    eva_common::db::init::init_schema(&pool).await.unwrap();
    pool
}

async fn seed_post(
    pool: &SqlitePool,
    platform_id: &str,
    day: &str,
    community: &str,
    brand: &str,
    tag: &str,
    intent: &str,
) {
    let (raw_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO raw_posts (source, platform_id, posted_at, body, meta, processed)
        VALUES ('reddit', ?, ? || 'T12:00:00Z', 'seeded body text for testing', ?, 1)
        RETURNING id
        "#,
    )
    .bind(platform_id)
    .bind(day)
    .bind(format!("{{\"community\": \"{community}\"}}"))
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query(
        r#"
        INSERT INTO processed_posts (raw_id, brands, tags, sentiment, intent, processor_version)
        VALUES (?, ?, ?, 'positive', ?, 'fallback:v1')
        "#,
    )
    .bind(raw_id)
    .bind(format!("[\"{brand}\"]"))
    .bind(format!("[\"{tag}\"]"))
    .bind(intent)
    .execute(pool)
    .await
    .unwrap();
}

fn day(s: &str) -> chrono::NaiveDate {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[tokio::test]
async fn busy_action_heavy_tags_latch_elevated_and_emit() {
    let pool = test_pool().await;

    // Six own-intent messages for one tag today.
    for i in 0..6 {
        seed_post(
            &pool,
            &format!("p{i}"),
            "2026-07-02",
            "running",
            "Hoka",
            "comfort-shoes",
            "own",
        )
        .await;
    }

    let emitter = TriggerEmitter::new(pool.clone());
    let stats = emitter.run(day("2026-07-02")).await.unwrap();
    assert_eq!(stats.tags_elevated, 1);

    let (state, confidence, last_seen): (String, f64, String) = sqlx::query_as(
        "SELECT state, confidence, last_seen FROM behavior_states WHERE tag = 'comfort-shoes'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(state, "ELEVATED");
    assert!(confidence >= 0.3);
    assert_eq!(last_seen, "2026-07-02");

    let (events,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM signal_events WHERE kind = 'TAG_ELEVATED' AND tag = 'comfort-shoes' AND day = '2026-07-02'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(events, 1);
}

#[tokio::test]
async fn quiet_tags_stay_normal() {
    let pool = test_pool().await;

    // Two messages: under the volume floor.
    for i in 0..2 {
        seed_post(&pool, &format!("q{i}"), "2026-07-02", "running", "Teva", "sandals", "own").await;
    }

    let emitter = TriggerEmitter::new(pool.clone());
    let stats = emitter.run(day("2026-07-02")).await.unwrap();
    assert_eq!(stats.tags_elevated, 0);

    let (state,): (String,) =
        sqlx::query_as("SELECT state FROM behavior_states WHERE tag = 'sandals'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(state, "NORMAL");

    let (events,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM signal_events WHERE kind = 'TAG_ELEVATED'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(events, 0);
}

#[tokio::test]
async fn elevation_latches_across_quiet_days() {
    let pool = test_pool().await;

    for i in 0..6 {
        seed_post(
            &pool,
            &format!("p{i}"),
            "2026-07-02",
            "running",
            "Hoka",
            "comfort-shoes",
            "own",
        )
        .await;
    }

    let emitter = TriggerEmitter::new(pool.clone());
    emitter.run(day("2026-07-02")).await.unwrap();

    // Next day is quiet; the state stays latched, and the still-recent tag
    // emits for the new day.
    let stats = emitter.run(day("2026-07-03")).await.unwrap();
    assert_eq!(stats.tags_elevated, 0);

    let (state,): (String,) =
        sqlx::query_as("SELECT state FROM behavior_states WHERE tag = 'comfort-shoes'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(state, "ELEVATED");

    let (events,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM signal_events WHERE kind = 'TAG_ELEVATED' AND tag = 'comfort-shoes'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(events, 2, "one event per (tag, day)");
}

#[tokio::test]
async fn rerunning_triggers_emits_nothing_new() {
    let pool = test_pool().await;

    for i in 0..6 {
        seed_post(
            &pool,
            &format!("p{i}"),
            "2026-07-02",
            "running",
            "Hoka",
            "comfort-shoes",
            "own",
        )
        .await;
    }

    let emitter = TriggerEmitter::new(pool.clone());
    let first = emitter.run(day("2026-07-02")).await.unwrap();
    assert!(first.events_emitted > 0);

    let second = emitter.run(day("2026-07-02")).await.unwrap();
    assert_eq!(second.events_emitted, 0, "unchanged projection emits zero events");
}

#[tokio::test]
async fn share_of_voice_swings_emit_brand_divergence() {
    let pool = test_pool().await;

    // Yesterday: Nike dominates the tag 4-1.
    for i in 0..4 {
        seed_post(&pool, &format!("y_n{i}"), "2026-07-01", "running", "Nike", "running", "own").await;
    }
    seed_post(&pool, "y_h0", "2026-07-01", "running", "Hoka", "running", "own").await;

    // Today: Hoka takes half the conversation.
    for i in 0..2 {
        seed_post(&pool, &format!("t_n{i}"), "2026-07-02", "running", "Nike", "running", "own").await;
    }
    for i in 0..2 {
        seed_post(&pool, &format!("t_h{i}"), "2026-07-02", "running", "Hoka", "running", "own").await;
    }

    let emitter = TriggerEmitter::new(pool.clone());
    emitter.run(day("2026-07-02")).await.unwrap();

    // Hoka moved from 20% to 50% of the tag's messages: +30pp.
    let (count, payload): (i64, String) = sqlx::query_as(
        r#"
        SELECT COUNT(*), MAX(payload) FROM signal_events
        WHERE kind = 'BRAND_DIVERGENCE' AND brand = 'Hoka' AND day = '2026-07-02'
        "#,
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
    let payload: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert!((payload["delta_pct"].as_f64().unwrap() - 30.0).abs() < 0.01);
}

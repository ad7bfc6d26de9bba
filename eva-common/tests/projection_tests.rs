//! Integration tests for the daily summary and candidate projections

use eva_common::db::projections;
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
    brands: &str,
    tags: &str,
    intent: &str,
) {
    let (raw_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO raw_posts (source, platform_id, posted_at, body, meta, processed)
        VALUES ('reddit', ?, ? || 'T09:00:00Z', 'body text long enough', ?, 1)
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
        VALUES (?, ?, ?, 'neutral', ?, 'fallback:v1')
        "#,
    )
    .bind(raw_id)
    .bind(brands)
    .bind(tags)
    .bind(intent)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn summary_counts_messages_communities_and_intent_rates() {
    let pool = test_pool().await;

    seed_post(&pool, "a", "2026-07-02", "running", r#"["Hoka"]"#, r#"["comfort"]"#, "own").await;
    seed_post(&pool, "b", "2026-07-02", "BuyItForLife", r#"["Hoka"]"#, r#"["comfort"]"#, "buy").await;
    seed_post(&pool, "c", "2026-07-02", "running", r#"["Hoka"]"#, r#"["comfort"]"#, "none").await;
    seed_post(&pool, "d", "2026-07-02", "Frugal", r#"["Hoka"]"#, r#"["comfort"]"#, "recommendation").await;

    let summary = projections::daily_brand_tag_summary(&pool, "2026-07-02")
        .await
        .unwrap();
    assert_eq!(summary.len(), 1);

    let row = &summary[0];
    assert_eq!(row.brand, "Hoka");
    assert_eq!(row.tag, "comfort");
    assert_eq!(row.msg_count, 4);
    assert_eq!(row.source_count, 1, "all posts come from one source system");
    assert_eq!(row.platform_count, 3, "three distinct communities");
    assert!((row.action_intent_rate - 0.75).abs() < 1e-9);
    assert!((row.eval_intent_rate - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn multi_brand_posts_count_once_per_brand() {
    let pool = test_pool().await;

    seed_post(
        &pool,
        "switch",
        "2026-07-02",
        "running",
        r#"["Nike", "Hoka"]"#,
        r#"["brand-switch"]"#,
        "own",
    )
    .await;

    let summary = projections::daily_brand_tag_summary(&pool, "2026-07-02")
        .await
        .unwrap();
    let brands: Vec<&str> = summary.iter().map(|r| r.brand.as_str()).collect();
    assert_eq!(summary.len(), 2);
    assert!(brands.contains(&"Nike"));
    assert!(brands.contains(&"Hoka"));
}

#[tokio::test]
async fn candidate_delta_tracks_share_of_voice_change() {
    let pool = test_pool().await;

    // Yesterday: Nike 3 of 4 (75%), Hoka 1 of 4 (25%).
    for i in 0..3 {
        seed_post(&pool, &format!("y_n{i}"), "2026-07-01", "running", r#"["Nike"]"#, r#"["running"]"#, "own").await;
    }
    seed_post(&pool, "y_h", "2026-07-01", "running", r#"["Hoka"]"#, r#"["running"]"#, "own").await;

    // Today: even split.
    seed_post(&pool, "t_n", "2026-07-02", "running", r#"["Nike"]"#, r#"["running"]"#, "own").await;
    seed_post(&pool, "t_h", "2026-07-02", "running", r#"["Hoka"]"#, r#"["running"]"#, "own").await;

    let candidates = projections::candidate_signals(&pool, "2026-07-02").await.unwrap();
    let hoka = candidates.iter().find(|c| c.brand == "Hoka").unwrap();
    let nike = candidates.iter().find(|c| c.brand == "Nike").unwrap();

    assert!((hoka.delta_pct - 25.0).abs() < 1e-6, "25% -> 50% is +25pp");
    assert!((nike.delta_pct + 25.0).abs() < 1e-6, "75% -> 50% is -25pp");
}

#[tokio::test]
async fn meme_risk_rises_with_evaluative_chatter() {
    let pool = test_pool().await;

    for i in 0..4 {
        seed_post(&pool, &format!("e{i}"), "2026-07-02", "running", r#"["Teva"]"#, r#"["sandals"]"#, "none").await;
    }
    seed_post(&pool, "a0", "2026-07-02", "running", r#"["Teva"]"#, r#"["sandals"]"#, "buy").await;

    let candidates = projections::candidate_signals(&pool, "2026-07-02").await.unwrap();
    let row = &candidates[0];

    // eval 0.8, action 0.2: meme risk 0.6.
    assert!((row.meme_risk - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn unprocessed_posts_do_not_appear_in_projections() {
    let pool = test_pool().await;

    sqlx::query(
        r#"
        INSERT INTO raw_posts (source, platform_id, posted_at, body, meta, processed)
        VALUES ('reddit', 'raw_only', '2026-07-02T09:00:00Z', 'body', '{}', 0)
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let summary = projections::daily_brand_tag_summary(&pool, "2026-07-01").await.unwrap();
    assert!(summary.is_empty());
}

#[tokio::test]
async fn elevated_tags_respects_the_cutoff() {
    let pool = test_pool().await;

    sqlx::query(
        r#"
        INSERT INTO behavior_states (tag, state, confidence, first_seen, last_seen) VALUES
            ('fresh', 'ELEVATED', 0.8, '2026-06-01', '2026-07-02'),
            ('stale', 'ELEVATED', 0.9, '2026-05-01', '2026-05-02'),
            ('normal', 'NORMAL', 0.5, '2026-07-01', '2026-07-02')
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let rows = projections::elevated_tags(&pool, "2026-07-01").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].tag, "fresh");
}

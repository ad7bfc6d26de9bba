//! Integration tests for the notifier claim/deliver loop
//!
//! Delivery targets an unroutable local port, so every delivery attempt
//! fails fast with a transport error; the claim and bookkeeping semantics
//! are what these tests exercise.

use eva_common::config::NotifySettings;
use eva_worker::notify::Notifier;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

fn notify_settings() -> NotifySettings {
    NotifySettings {
        gateway_url: "http://127.0.0.1:1".to_string(),
        topic: "eva-recommendations".to_string(),
        timeout_secs: 1,
        poll_interval_secs: 60,
        max_attempts: 5,
    }
}

async fn file_pool(dir: &TempDir) -> SqlitePool {
    let path = dir.path().join("eva.db");
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", path.display()))
        .await
        .unwrap();
    eva_common::db::init::init_schema(&pool).await.unwrap();
    pool
}

/// Insert an eligible event plus a draft; returns the draft id.
async fn seed_draft(pool: &SqlitePool, n: i64, approved: bool) -> i64 {
    let (event_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO signal_events (kind, tag, brand, day, severity)
        VALUES ('RECOMMENDATION_ELIGIBLE', 'comfort', 'Brand' || ?, '2026-07-01', 'critical')
        RETURNING id
        "#,
    )
    .bind(n)
    .fetch_one(pool)
    .await
    .unwrap();

    let (draft_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO recommendation_drafts
            (signal_event_id, brand, tag, event_time, final_confidence, band,
             bundle_path, bundle_sha256, markdown_path, markdown_sha256, approved,
             created_at)
        VALUES (?, 'Brand' || ?, 'comfort', '2026-07-01T12:00:00Z', 0.64, 'HIGH',
                'b.json.gz', 'aa', 'd.md', 'bb', ?,
                strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+' || ? || ' seconds'))
        RETURNING id
        "#,
    )
    .bind(event_id)
    .bind(event_id)
    .bind(approved)
    .bind(n)
    .fetch_one(pool)
    .await
    .unwrap();

    draft_id
}

#[tokio::test]
async fn only_approved_unnotified_drafts_are_claimed() {
    let dir = TempDir::new().unwrap();
    let pool = file_pool(&dir).await;

    let approved = seed_draft(&pool, 1, true).await;
    let unapproved = seed_draft(&pool, 2, false).await;

    let notifier = Notifier::new(pool.clone(), notify_settings()).unwrap();
    let claimed = notifier.claim_batch().await.unwrap();

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, approved);
    assert_eq!(claimed[0].notify_attempts, 1, "claim costs one attempt");

    let (attempts,): (i64,) =
        sqlx::query_as("SELECT notify_attempts FROM recommendation_drafts WHERE id = ?")
            .bind(unapproved)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(attempts, 0);
}

#[tokio::test]
async fn concurrent_claims_partition_the_set() {
    let dir = TempDir::new().unwrap();
    let pool = file_pool(&dir).await;

    for n in 1..=4 {
        seed_draft(&pool, n, true).await;
    }

    let a = Notifier::new(pool.clone(), notify_settings()).unwrap();
    let b = Notifier::new(pool.clone(), notify_settings()).unwrap();

    let (ra, rb) = tokio::join!(a.claim_batch(), b.claim_batch());
    let claimed_a = ra.unwrap();
    let claimed_b = rb.unwrap();

    // Exactly one worker acquires each row.
    let mut all: Vec<i64> = claimed_a.iter().chain(claimed_b.iter()).map(|d| d.id).collect();
    all.sort_unstable();
    let before = all.len();
    all.dedup();
    assert_eq!(all.len(), before, "no draft claimed twice");
    assert_eq!(all.len(), 4, "every draft claimed exactly once across workers");

    // Attempts incremented exactly once per claim.
    let (total_attempts,): (i64,) =
        sqlx::query_as("SELECT SUM(notify_attempts) FROM recommendation_drafts")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(total_attempts, 4);
}

#[tokio::test]
async fn failed_deliveries_record_error_and_leave_unnotified() {
    let dir = TempDir::new().unwrap();
    let pool = file_pool(&dir).await;
    let draft_id = seed_draft(&pool, 1, true).await;

    let notifier = Notifier::new(pool.clone(), notify_settings()).unwrap();
    let stats = notifier.poll_and_notify().await.unwrap();
    assert_eq!(stats.claimed, 1);
    assert_eq!(stats.sent, 0);
    assert_eq!(stats.failed, 1);

    let (notified_at, last_error, attempts): (Option<String>, Option<String>, i64) =
        sqlx::query_as(
            "SELECT notified_at, last_notify_error, notify_attempts FROM recommendation_drafts WHERE id = ?",
        )
        .bind(draft_id)
        .fetch_one(&pool)
        .await
        .unwrap();

    assert!(notified_at.is_none());
    assert!(last_error.unwrap().contains("transport"));
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn poison_drafts_drop_out_of_the_claim_set() {
    let dir = TempDir::new().unwrap();
    let pool = file_pool(&dir).await;
    let draft_id = seed_draft(&pool, 1, true).await;

    let notifier = Notifier::new(pool.clone(), notify_settings()).unwrap();

    // Five failing polls exhaust the attempt budget.
    for expected_attempt in 1..=5 {
        let stats = notifier.poll_and_notify().await.unwrap();
        assert_eq!(stats.claimed, 1, "attempt {expected_attempt} should claim");
        let (attempts,): (i64,) =
            sqlx::query_as("SELECT notify_attempts FROM recommendation_drafts WHERE id = ?")
                .bind(draft_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(attempts, expected_attempt);
    }

    // The sixth cycle skips the poison row entirely.
    let stats = notifier.poll_and_notify().await.unwrap();
    assert_eq!(stats.claimed, 0);

    let (attempts, last_error): (i64, Option<String>) = sqlx::query_as(
        "SELECT notify_attempts, last_notify_error FROM recommendation_drafts WHERE id = ?",
    )
    .bind(draft_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(attempts, 5);
    assert!(last_error.is_some(), "most recent error is preserved");

    // Operator reset makes it claimable again.
    sqlx::query(
        "UPDATE recommendation_drafts SET notify_attempts = 0, last_notify_error = NULL WHERE id = ?",
    )
    .bind(draft_id)
    .execute(&pool)
    .await
    .unwrap();
    let stats = notifier.poll_and_notify().await.unwrap();
    assert_eq!(stats.claimed, 1);
}

#[tokio::test]
async fn revoked_approval_blocks_the_success_mark() {
    let dir = TempDir::new().unwrap();
    let pool = file_pool(&dir).await;
    let draft_id = seed_draft(&pool, 1, true).await;

    let notifier = Notifier::new(pool.clone(), notify_settings()).unwrap();
    let claimed = notifier.claim_batch().await.unwrap();
    assert_eq!(claimed.len(), 1);

    // Approval revoked between claim and delivery confirmation.
    sqlx::query("UPDATE recommendation_drafts SET approved = 0 WHERE id = ?")
        .bind(draft_id)
        .execute(&pool)
        .await
        .unwrap();

    let marked = notifier.mark_sent(draft_id).await.unwrap();
    assert!(!marked, "success mark requires approved = 1");

    let (notified_at,): (Option<String>,) =
        sqlx::query_as("SELECT notified_at FROM recommendation_drafts WHERE id = ?")
            .bind(draft_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(notified_at.is_none());
}

#[tokio::test]
async fn notified_drafts_are_never_reclaimed() {
    let dir = TempDir::new().unwrap();
    let pool = file_pool(&dir).await;
    let draft_id = seed_draft(&pool, 1, true).await;

    let notifier = Notifier::new(pool.clone(), notify_settings()).unwrap();
    let claimed = notifier.claim_batch().await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert!(notifier.mark_sent(draft_id).await.unwrap());

    // Delivering to an already-notified draft is a no-op at both layers.
    assert!(!notifier.mark_sent(draft_id).await.unwrap());
    let claimed = notifier.claim_batch().await.unwrap();
    assert!(claimed.is_empty());

    // Invariant: notified implies approved.
    let (bad_rows,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM recommendation_drafts WHERE notified_at IS NOT NULL AND approved = 0",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(bad_rows, 0);
}

//! Notification delivery
//!
//! Claims approved, un-notified drafts and delivers them to the push
//! gateway at-least-once. The claim is one UPDATE statement that stamps a
//! lease and increments the attempts counter, so two workers can never
//! claim the same draft and every claim costs one attempt even if delivery
//! crashes afterward. Drafts that exhaust their attempts are poison: they
//! stay out of the claim set until an operator resets them.

use eva_common::config::NotifySettings;
use eva_common::db::models::RecommendationDraft;
use eva_common::retry::retry_on_lock;
use eva_common::Result;
use sqlx::SqlitePool;
use std::time::Duration;

/// How long a claim lease lasts before a crashed worker's draft becomes
/// claimable again.
const CLAIM_LEASE_SECS: i64 = 120;
/// Claim batch size.
const CLAIM_BATCH: i64 = 10;
/// Maximum stored error length.
const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyStats {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct Notifier {
    db: SqlitePool,
    http_client: reqwest::Client,
    cfg: NotifySettings,
}

impl Notifier {
    pub fn new(db: SqlitePool, cfg: NotifySettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            db,
            http_client,
            cfg,
        })
    }

    /// Claim up to `CLAIM_BATCH` deliverable drafts, oldest first.
    ///
    /// The UPDATE flips the lease predicate it selects on, so concurrent
    /// claimers partition the set; `notify_attempts` increments at claim
    /// time by design.
    pub async fn claim_batch(&self) -> Result<Vec<RecommendationDraft>> {
        let db = self.db.clone();
        let max_attempts = self.cfg.max_attempts;

        retry_on_lock("claim drafts", 5_000, || {
            let db = db.clone();
            async move {
                let rows = sqlx::query_as::<_, RecommendationDraft>(
                    r#"
                    UPDATE recommendation_drafts
                    SET notify_attempts = notify_attempts + 1,
                        claimed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                    WHERE id IN (
                        SELECT id FROM recommendation_drafts
                        WHERE approved = 1
                          AND notified_at IS NULL
                          AND notify_attempts < ?
                          AND (claimed_at IS NULL
                               OR claimed_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?))
                        ORDER BY created_at ASC, id ASC
                        LIMIT ?
                    )
                    RETURNING id, signal_event_id, brand, tag, event_time, final_confidence, band,
                              bundle_path, bundle_sha256, markdown_path, markdown_sha256,
                              approved, approved_by, approved_at, notified_at, claimed_at,
                              notify_attempts, last_notify_error, created_at
                    "#,
                )
                .bind(max_attempts)
                .bind(format!("-{CLAIM_LEASE_SECS} seconds"))
                .bind(CLAIM_BATCH)
                .fetch_all(&db)
                .await?;
                Ok(rows)
            }
        })
        .await
    }

    /// One notifier poll: claim, deliver, record outcomes.
    pub async fn poll_and_notify(&self) -> Result<NotifyStats> {
        let claimed = self.claim_batch().await?;
        let mut stats = NotifyStats {
            claimed: claimed.len(),
            ..Default::default()
        };

        if claimed.is_empty() {
            return Ok(stats);
        }

        tracing::info!(pending = claimed.len(), "Claimed drafts for notification");

        for draft in claimed {
            match self.deliver(&draft).await {
                Ok(()) => {
                    let still_approved = self.mark_sent(draft.id).await?;
                    if still_approved {
                        stats.sent += 1;
                        tracing::info!(
                            draft_id = draft.id,
                            brand = %draft.brand,
                            tag = %draft.tag,
                            "Notification sent"
                        );
                    } else {
                        // Approval was revoked between claim and delivery;
                        // the delivery is recorded as an error, not success.
                        stats.failed += 1;
                        self.mark_failed(draft.id, "approval revoked before delivery confirmation")
                            .await?;
                        tracing::warn!(
                            draft_id = draft.id,
                            "Approval revoked mid-delivery; draft left unnotified"
                        );
                    }
                }
                Err(message) => {
                    stats.failed += 1;
                    self.mark_failed(draft.id, &message).await?;
                    tracing::error!(
                        draft_id = draft.id,
                        attempts = draft.notify_attempts,
                        error = %message,
                        "Notification delivery failed"
                    );
                }
            }
        }

        Ok(stats)
    }

    /// POST the draft to the push gateway. Returns a normalized error
    /// string on any failure.
    async fn deliver(&self, draft: &RecommendationDraft) -> std::result::Result<(), String> {
        let confidence = draft.final_confidence.unwrap_or(0.0);
        let payload = serde_json::json!({
            "topic": self.cfg.topic,
            "title": "EVA-Finance Recommendation",
            "message": format!("{} ({}) - Confidence: {:.2}", draft.brand, draft.tag, confidence),
            "priority": 3,
            "tags": ["chart_increasing"],
            "extras": {
                "draft_id": draft.id,
                "signal_event_id": draft.signal_event_id,
                "brand": draft.brand,
                "tag": draft.tag,
                "confidence": confidence,
            },
        });

        let response = self
            .http_client
            .post(&self.cfg.gateway_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| truncate_error(&format!("transport: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(truncate_error(&format!("gateway {status}: {body}")));
        }

        Ok(())
    }

    /// Mark a draft delivered. The guard re-checks `approved` so a
    /// revocation between claim and delivery can never produce a
    /// notified-but-unapproved row. Returns whether the guard held.
    pub async fn mark_sent(&self, draft_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE recommendation_drafts
            SET notified_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                claimed_at = NULL,
                last_notify_error = NULL
            WHERE id = ? AND approved = 1 AND notified_at IS NULL
            "#,
        )
        .bind(draft_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a delivery failure and release the claim lease. The attempts
    /// counter was already charged at claim time.
    pub async fn mark_failed(&self, draft_id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE recommendation_drafts
            SET last_notify_error = ?,
                claimed_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(truncate_error(error))
        .bind(draft_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_LEN).collect()
}

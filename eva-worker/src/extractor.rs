//! Extraction claim loop
//!
//! Claims unprocessed raw posts in bounded batches and writes one processed
//! row per raw row. The claim is a single UPDATE over a bounded subselect,
//! so concurrent workers never receive the same rows. A raw row is left
//! claimed only once its processed row exists; on failure it is unclaimed
//! and retried in a later batch.

use crate::extract::ExtractionStrategy;
use eva_common::db::models::RawPost;
use eva_common::retry::retry_on_lock;
use eva_common::Result;
use sqlx::SqlitePool;

pub struct Extractor {
    db: SqlitePool,
    strategy: ExtractionStrategy,
    batch_size: i64,
}

impl Extractor {
    pub fn new(db: SqlitePool, strategy: ExtractionStrategy, batch_size: i64) -> Self {
        Self {
            db,
            strategy,
            batch_size,
        }
    }

    /// Claim one batch of unprocessed posts atomically.
    pub async fn claim_batch(&self) -> Result<Vec<RawPost>> {
        let db = self.db.clone();
        let batch_size = self.batch_size;

        retry_on_lock("claim raw posts", 5_000, || {
            let db = db.clone();
            async move {
                let rows = sqlx::query_as::<_, RawPost>(
                    r#"
                    UPDATE raw_posts
                    SET processed = 1
                    WHERE id IN (
                        SELECT id FROM raw_posts
                        WHERE processed = 0
                        ORDER BY id ASC
                        LIMIT ?
                    )
                    RETURNING id, source, platform_id, posted_at, body, url, meta, processed
                    "#,
                )
                .bind(batch_size)
                .fetch_all(&db)
                .await?;
                Ok(rows)
            }
        })
        .await
    }

    /// Process one batch. Returns how many rows were claimed (zero means
    /// the caller should idle).
    pub async fn process_batch(&self) -> Result<usize> {
        let batch = self.claim_batch().await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let claimed = batch.len();
        tracing::debug!(claimed, "Claimed raw posts for extraction");

        for raw in batch {
            let result = self.strategy.extract(&raw.body).await;

            let write = sqlx::query(
                r#"
                INSERT INTO processed_posts
                    (raw_id, brands, tags, sentiment, intent, tickers, processor_version)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (raw_id) DO NOTHING
                "#,
            )
            .bind(raw.id)
            .bind(serde_json::to_string(&result.brands).unwrap_or_else(|_| "[]".into()))
            .bind(serde_json::to_string(&result.tags).unwrap_or_else(|_| "[]".into()))
            .bind(result.sentiment.as_str())
            .bind(result.intent.as_str())
            .bind(serde_json::to_string(&result.tickers).unwrap_or_else(|_| "[]".into()))
            .bind(&result.processor_version)
            .execute(&self.db)
            .await;

            match write {
                Ok(_) => {
                    tracing::debug!(
                        raw_id = raw.id,
                        brands = result.brands.len(),
                        tags = result.tags.len(),
                        processor = %result.processor_version,
                        "Processed raw post"
                    );
                }
                Err(e) => {
                    tracing::error!(raw_id = raw.id, error = %e, "Failed to write processed row");
                    // Unclaim so a later batch retries this post.
                    if let Err(unclaim_err) =
                        sqlx::query("UPDATE raw_posts SET processed = 0 WHERE id = ?")
                            .bind(raw.id)
                            .execute(&self.db)
                            .await
                    {
                        tracing::error!(
                            raw_id = raw.id,
                            error = %unclaim_err,
                            "Failed to unclaim raw post"
                        );
                    }
                }
            }
        }

        Ok(claimed)
    }
}

//! Read-only projections over the base tables
//!
//! The daily brand+tag summary and the candidate-signal view are computed
//! directly from `processed_posts` joined to `raw_posts`, unnesting the
//! brand and tag JSON arrays. Everything downstream (triggers, scoring) is
//! re-computable from these queries at any day.

use crate::Result;
use sqlx::SqlitePool;

/// One `(day, brand, tag)` row of the daily summary projection.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailySummary {
    pub day: String,
    pub brand: String,
    pub tag: String,
    pub msg_count: i64,
    /// Distinct origin systems.
    pub source_count: i64,
    /// Distinct communities within the sources.
    pub platform_count: i64,
    /// Share of messages with buy/own/recommendation intent.
    pub action_intent_rate: f64,
    /// Share of messages that are evaluative chatter (no action intent).
    pub eval_intent_rate: f64,
}

/// A candidate signal: the daily summary plus the day-over-day
/// share-of-voice delta (percentage points within the tag) and the
/// meme-risk heuristic.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CandidateSignal {
    pub day: String,
    pub brand: String,
    pub tag: String,
    pub msg_count: i64,
    pub source_count: i64,
    pub platform_count: i64,
    pub action_intent_rate: f64,
    pub eval_intent_rate: f64,
    /// Change in this brand's share of the tag's daily messages vs the
    /// previous day, in percentage points.
    pub delta_pct: f64,
    /// High evaluation with low action reads as meme chatter.
    pub meme_risk: f64,
}

const SUMMARY_CTE: &str = r#"
    SELECT date(r.posted_at) AS day,
           b.value AS brand,
           t.value AS tag,
           COUNT(*) AS msg_count,
           COUNT(DISTINCT r.source) AS source_count,
           COUNT(DISTINCT COALESCE(json_extract(r.meta, '$.community'), r.source)) AS platform_count,
           AVG(CASE WHEN p.intent IN ('buy', 'own', 'recommendation') THEN 1.0 ELSE 0.0 END) AS action_intent_rate,
           AVG(CASE WHEN p.intent IN ('none', 'complaint') THEN 1.0 ELSE 0.0 END) AS eval_intent_rate
    FROM processed_posts p
    JOIN raw_posts r ON r.id = p.raw_id
    JOIN json_each(p.brands) b
    JOIN json_each(p.tags) t
    WHERE b.value <> '' AND t.value <> ''
    GROUP BY day, brand, tag
"#;

/// Fetch the daily brand+tag summary for days at or after `since_day`
/// (YYYY-MM-DD).
pub async fn daily_brand_tag_summary(
    pool: &SqlitePool,
    since_day: &str,
) -> Result<Vec<DailySummary>> {
    let sql = format!(
        "WITH summary AS ({SUMMARY_CTE})
         SELECT day, brand, tag, msg_count, source_count, platform_count,
                action_intent_rate, eval_intent_rate
         FROM summary
         WHERE day >= ?
         ORDER BY day, tag, brand"
    );

    let rows = sqlx::query_as::<_, DailySummary>(&sql)
        .bind(since_day)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Fetch candidate signals for days at or after `since_day` (YYYY-MM-DD).
///
/// The delta is computed against the same brand's share of the tag on the
/// previous calendar day; a brand with no previous-day row has a delta equal
/// to its full current share.
pub async fn candidate_signals(
    pool: &SqlitePool,
    since_day: &str,
) -> Result<Vec<CandidateSignal>> {
    let sql = format!(
        "WITH summary AS ({SUMMARY_CTE}),
         shares AS (
             SELECT *,
                    100.0 * msg_count / SUM(msg_count) OVER (PARTITION BY day, tag) AS share_pct
             FROM summary
         )
         SELECT s.day, s.brand, s.tag, s.msg_count, s.source_count, s.platform_count,
                s.action_intent_rate, s.eval_intent_rate,
                s.share_pct - COALESCE(prev.share_pct, 0.0) AS delta_pct,
                MAX(0.0, MIN(1.0, s.eval_intent_rate - s.action_intent_rate)) AS meme_risk
         FROM shares s
         LEFT JOIN shares prev
             ON prev.tag = s.tag
            AND prev.brand = s.brand
            AND prev.day = date(s.day, '-1 day')
         WHERE s.day >= ?
         ORDER BY s.day, s.tag, s.brand"
    );

    let rows = sqlx::query_as::<_, CandidateSignal>(&sql)
        .bind(since_day)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// One elevated-tag trigger row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ElevatedTag {
    pub tag: String,
    pub confidence: f64,
    pub last_seen: String,
}

/// Tags currently `ELEVATED` with activity at or after `cutoff_day`.
pub async fn elevated_tags(pool: &SqlitePool, cutoff_day: &str) -> Result<Vec<ElevatedTag>> {
    let rows = sqlx::query_as::<_, ElevatedTag>(
        r#"
        SELECT tag, confidence, last_seen
        FROM behavior_states
        WHERE state = 'ELEVATED' AND last_seen >= ?
        ORDER BY last_seen DESC
        "#,
    )
    .bind(cutoff_day)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

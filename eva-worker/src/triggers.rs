//! Trigger emission
//!
//! Maintains the tag-level behavior state machine and converts projections
//! into signal events. Dedup is enforced by the unique
//! `(kind, tag, brand, day)` index, so re-running over an unchanged
//! projection emits nothing new.

use chrono::NaiveDate;
use eva_common::db::models::{EventKind, Severity, TagState};
use eva_common::db::projections;
use eva_common::Result;
use sqlx::SqlitePool;

/// Minimum daily messages before a tag can latch ELEVATED.
const ELEVATION_MIN_MESSAGES: i64 = 5;
/// Minimum action-intent rate before a tag can latch ELEVATED.
const ELEVATION_MIN_ACTION_RATE: f64 = 0.3;
/// Share-of-voice change (percentage points) that counts as divergence.
const DIVERGENCE_MIN_DELTA_PCT: f64 = 5.0;
/// |z| above this makes a divergence critical.
const DIVERGENCE_CRITICAL_Z: f64 = 2.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerStats {
    pub tags_elevated: usize,
    pub events_emitted: usize,
}

pub struct TriggerEmitter {
    db: SqlitePool,
}

impl TriggerEmitter {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Run one trigger pass for `today`: refresh behavior states from the
    /// day's summary, then emit TAG_ELEVATED and BRAND_DIVERGENCE events.
    pub async fn run(&self, today: NaiveDate) -> Result<TriggerStats> {
        let mut stats = TriggerStats::default();
        let today_str = today.format("%Y-%m-%d").to_string();

        stats.tags_elevated = self.update_behavior_states(&today_str).await?;
        stats.events_emitted += self.emit_tag_elevated(today).await?;
        stats.events_emitted += self.emit_brand_divergence(&today_str).await?;

        Ok(stats)
    }

    /// Latch tags into ELEVATED when today's volume and action rate clear
    /// the floor. Existing rows only ever advance `last_seen` and
    /// confidence; the state transition latches until a scoring run says
    /// otherwise.
    async fn update_behavior_states(&self, today: &str) -> Result<usize> {
        let summary = projections::daily_brand_tag_summary(&self.db, today).await?;

        // Aggregate across brands within each tag for the day.
        let mut per_tag: std::collections::HashMap<&str, (i64, f64)> =
            std::collections::HashMap::new();
        for row in &summary {
            if row.day != today {
                continue;
            }
            let entry = per_tag.entry(row.tag.as_str()).or_insert((0, 0.0));
            entry.0 += row.msg_count;
            entry.1 += row.action_intent_rate * row.msg_count as f64;
        }

        let mut elevated = 0;
        for (tag, (msg_count, weighted_action)) in per_tag {
            let action_rate = if msg_count > 0 {
                weighted_action / msg_count as f64
            } else {
                0.0
            };

            if msg_count >= ELEVATION_MIN_MESSAGES && action_rate >= ELEVATION_MIN_ACTION_RATE {
                let confidence = action_rate.clamp(0.0, 1.0);
                sqlx::query(
                    r#"
                    INSERT INTO behavior_states (tag, state, confidence, first_seen, last_seen)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT (tag) DO UPDATE SET
                        state = excluded.state,
                        confidence = MAX(confidence, excluded.confidence),
                        last_seen = MAX(last_seen, excluded.last_seen)
                    "#,
                )
                .bind(tag)
                .bind(TagState::Elevated.as_str())
                .bind(confidence)
                .bind(today)
                .bind(today)
                .execute(&self.db)
                .await?;
                elevated += 1;
            } else {
                // Track first/last sighting without changing a latched state.
                sqlx::query(
                    r#"
                    INSERT INTO behavior_states (tag, state, confidence, first_seen, last_seen)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT (tag) DO UPDATE SET
                        last_seen = MAX(last_seen, excluded.last_seen)
                    "#,
                )
                .bind(tag)
                .bind(TagState::Normal.as_str())
                .bind(action_rate.clamp(0.0, 1.0))
                .bind(today)
                .bind(today)
                .execute(&self.db)
                .await?;
            }
        }

        Ok(elevated)
    }

    /// One TAG_ELEVATED event per `(tag, today)` for tags still active.
    async fn emit_tag_elevated(&self, today: NaiveDate) -> Result<usize> {
        let cutoff = (today - chrono::Duration::days(1))
            .format("%Y-%m-%d")
            .to_string();
        let today_str = today.format("%Y-%m-%d").to_string();

        let elevated = projections::elevated_tags(&self.db, &cutoff).await?;
        let mut emitted = 0;

        for row in elevated {
            let payload = serde_json::json!({ "confidence": row.confidence });
            let result = sqlx::query(
                r#"
                INSERT INTO signal_events (kind, tag, brand, day, severity, payload)
                VALUES (?, ?, '', ?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(EventKind::TagElevated.as_str())
            .bind(&row.tag)
            .bind(&today_str)
            .bind(Severity::Warning.as_str())
            .bind(payload.to_string())
            .execute(&self.db)
            .await?;

            if result.rows_affected() > 0 {
                emitted += 1;
                tracing::info!(tag = %row.tag, confidence = row.confidence, "TAG_ELEVATED");
            }
        }

        Ok(emitted)
    }

    /// One BRAND_DIVERGENCE event per `(brand, day)` where the brand's
    /// share of tag-day messages moved at least 5 percentage points.
    /// Severity is critical when the move is a >2-sigma outlier among the
    /// tag's deltas that day.
    async fn emit_brand_divergence(&self, today: &str) -> Result<usize> {
        let candidates = projections::candidate_signals(&self.db, today).await?;

        // z-scores are computed within (day, tag) across brands.
        let mut groups: std::collections::HashMap<(String, String), Vec<f64>> =
            std::collections::HashMap::new();
        for c in &candidates {
            groups
                .entry((c.day.clone(), c.tag.clone()))
                .or_default()
                .push(c.delta_pct);
        }

        let mut emitted = 0;
        for c in &candidates {
            if c.brand.is_empty() || c.delta_pct.abs() < DIVERGENCE_MIN_DELTA_PCT {
                continue;
            }

            let deltas = &groups[&(c.day.clone(), c.tag.clone())];
            let z = z_score(c.delta_pct, deltas);
            let severity = if z.abs() > DIVERGENCE_CRITICAL_Z {
                Severity::Critical
            } else {
                Severity::Warning
            };

            let payload = serde_json::json!({
                "delta_pct": c.delta_pct,
                "z_score": z,
                "tag": c.tag,
            });
            let result = sqlx::query(
                r#"
                INSERT INTO signal_events (kind, tag, brand, day, severity, payload)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(EventKind::BrandDivergence.as_str())
            .bind(&c.tag)
            .bind(&c.brand)
            .bind(&c.day)
            .bind(severity.as_str())
            .bind(payload.to_string())
            .execute(&self.db)
            .await?;

            if result.rows_affected() > 0 {
                emitted += 1;
                tracing::info!(
                    brand = %c.brand,
                    tag = %c.tag,
                    delta_pct = c.delta_pct,
                    z,
                    severity = severity.as_str(),
                    "BRAND_DIVERGENCE"
                );
            }
        }

        Ok(emitted)
    }
}

/// Standard score of `value` within its population. Zero when the
/// population is degenerate.
fn z_score(value: f64, population: &[f64]) -> f64 {
    if population.len() < 2 {
        return 0.0;
    }
    let mean = population.iter().sum::<f64>() / population.len() as f64;
    let variance =
        population.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / population.len() as f64;
    let std = variance.sqrt();
    if std < f64::EPSILON {
        0.0
    } else {
        (value - mean) / std
    }
}

//! Scoring runner
//!
//! Iterates the candidate-signal projection over the lookback window,
//! computes factor scores, applies gates and bands, optionally
//! cross-validates HIGH candidates against search interest, persists one
//! score row per `(day, brand, tag, scoring_version)`, and emits
//! watchlist/eligibility events. Re-runs are idempotent: score rows upsert
//! and events dedupe on their unique keys.

use super::{
    acceleration_from_delta, band_for, baseline_from_msg_count, classify, intent_from_action_rate,
    spread_from_counts, suppression_from_meme_risk, warm_reason, FactorScores, SCORING_VERSION,
};
use crate::trends::{TrendsOutcome, TrendsValidator};
use chrono::NaiveDate;
use eva_common::config::Settings;
use eva_common::db::models::{Band, EventKind, Severity, ValidationStatus};
use eva_common::db::projections::{self, CandidateSignal};
use eva_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct ScoreRunStats {
    pub candidates: usize,
    pub scored: usize,
    pub eligible_events: usize,
    pub warm_events: usize,
    pub validations: usize,
    pub validations_pending: usize,
}

pub struct Scorer {
    db: SqlitePool,
    settings: Settings,
    validator: Option<Arc<TrendsValidator>>,
}

impl Scorer {
    pub fn new(db: SqlitePool, settings: Settings, validator: Option<Arc<TrendsValidator>>) -> Self {
        Self {
            db,
            settings,
            validator,
        }
    }

    /// Score all candidates in the lookback window ending at `today`.
    pub async fn run(&self, today: NaiveDate) -> Result<ScoreRunStats> {
        let run_id = Uuid::new_v4();
        let since = today - chrono::Duration::days(self.settings.scoring.lookback_days);
        let since_str = since.format("%Y-%m-%d").to_string();

        let candidates = projections::candidate_signals(&self.db, &since_str).await?;
        let mut stats = ScoreRunStats {
            candidates: candidates.len(),
            ..Default::default()
        };

        tracing::info!(
            %run_id,
            candidates = candidates.len(),
            since = %since_str,
            "Starting scoring run"
        );

        for candidate in candidates {
            // Candidates without both a brand and a tag are not actionable.
            if candidate.brand.trim().is_empty() || candidate.tag.trim().is_empty() {
                continue;
            }

            self.score_candidate(&candidate, &mut stats).await?;
            stats.scored += 1;
        }

        tracing::info!(
            %run_id,
            scored = stats.scored,
            eligible = stats.eligible_events,
            warm = stats.warm_events,
            "Scoring run complete"
        );

        Ok(stats)
    }

    async fn score_candidate(
        &self,
        candidate: &CandidateSignal,
        stats: &mut ScoreRunStats,
    ) -> Result<()> {
        let scores = FactorScores {
            acceleration: acceleration_from_delta(candidate.delta_pct),
            intent: intent_from_action_rate(candidate.action_intent_rate),
            spread: spread_from_counts(candidate.source_count, candidate.platform_count),
            baseline: baseline_from_msg_count(candidate.msg_count),
            suppression: suppression_from_meme_risk(candidate.meme_risk),
        };

        let outcome = classify(&scores, &self.settings.gates, &self.settings.bands);
        let mut band = outcome.band;
        let mut final_confidence = outcome.final_confidence;
        let base_confidence = outcome.final_confidence;

        let mut details = serde_json::json!({
            "inputs": {
                "delta_pct": candidate.delta_pct,
                "msg_count": candidate.msg_count,
                "source_count": candidate.source_count,
                "platform_count": candidate.platform_count,
                "action_intent_rate": candidate.action_intent_rate,
                "eval_intent_rate": candidate.eval_intent_rate,
                "meme_risk": candidate.meme_risk,
            },
            "scores": {
                "acceleration": scores.acceleration,
                "intent": scores.intent,
                "spread": scores.spread,
                "baseline": scores.baseline,
                "suppression": scores.suppression,
            },
        });

        // Cross-validation: HIGH candidates above the confidence floor.
        if band == Band::High
            && self.settings.trends.enabled
            && final_confidence >= self.settings.trends.min_confidence
        {
            if let Some(validator) = &self.validator {
                let validation = validator.validate_brand(&candidate.brand).await;
                self.persist_validation(&candidate.brand, &validation).await?;
                stats.validations += 1;

                match validation.status {
                    ValidationStatus::Completed => {
                        final_confidence =
                            (final_confidence + validation.confidence_boost).clamp(0.0, 1.0);
                        band = band_for(final_confidence, &self.settings.bands);

                        details["validation"] = serde_json::json!({
                            "status": "completed",
                            "validates_signal": validation.validates_signal,
                            "search_interest": validation.search_interest,
                            "trend_direction": validation.direction.as_str(),
                            "confidence_boost": validation.confidence_boost,
                            "base_confidence": base_confidence,
                            "adjusted_confidence": final_confidence,
                        });

                        tracing::info!(
                            brand = %candidate.brand,
                            tag = %candidate.tag,
                            boost = validation.confidence_boost,
                            base = base_confidence,
                            adjusted = final_confidence,
                            band = band.as_str(),
                            "Applied trends validation"
                        );
                    }
                    ValidationStatus::Pending => {
                        // No data: the score and band stand unchanged.
                        stats.validations_pending += 1;
                        details["validation"] = serde_json::json!({
                            "status": "pending",
                            "error": validation.error,
                        });
                    }
                }
            }
        }

        let gate_reason = outcome.gate_failed_reason.clone();

        sqlx::query(
            r#"
            INSERT INTO confidence_scores (
                day, brand, tag, scoring_version,
                acceleration_score, intent_score, spread_score, baseline_score, suppression_score,
                final_confidence, band, gate_failed_reason, details
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (day, brand, tag, scoring_version) DO UPDATE SET
                acceleration_score = excluded.acceleration_score,
                intent_score = excluded.intent_score,
                spread_score = excluded.spread_score,
                baseline_score = excluded.baseline_score,
                suppression_score = excluded.suppression_score,
                final_confidence = excluded.final_confidence,
                band = excluded.band,
                gate_failed_reason = excluded.gate_failed_reason,
                details = excluded.details,
                computed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            "#,
        )
        .bind(&candidate.day)
        .bind(&candidate.brand)
        .bind(&candidate.tag)
        .bind(SCORING_VERSION)
        .bind(scores.acceleration)
        .bind(scores.intent)
        .bind(scores.spread)
        .bind(scores.baseline)
        .bind(scores.suppression)
        .bind(final_confidence)
        .bind(band.as_str())
        .bind(&gate_reason)
        .bind(details.to_string())
        .execute(&self.db)
        .await?;

        match band {
            Band::High => {
                let payload = serde_json::json!({
                    "final_confidence": final_confidence,
                    "scoring_version": SCORING_VERSION,
                });
                let result = sqlx::query(
                    r#"
                    INSERT INTO signal_events (kind, tag, brand, day, severity, payload)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(EventKind::RecommendationEligible.as_str())
                .bind(&candidate.tag)
                .bind(&candidate.brand)
                .bind(&candidate.day)
                .bind(Severity::Critical.as_str())
                .bind(payload.to_string())
                .execute(&self.db)
                .await?;

                if result.rows_affected() > 0 {
                    stats.eligible_events += 1;
                    tracing::info!(
                        brand = %candidate.brand,
                        tag = %candidate.tag,
                        day = %candidate.day,
                        final_confidence,
                        "RECOMMENDATION_ELIGIBLE"
                    );
                }
            }
            _ => {
                // Watchlist breadcrumbs: candidates that landed in the
                // WATCHLIST band, plus gated ones with a meaningfully strong
                // dimension.
                let reason = if band == Band::Watchlist {
                    Some("BAND_WATCHLIST")
                } else {
                    warm_reason(&scores)
                };
                if let Some(reason) = reason {
                    let payload = serde_json::json!({
                        "reason": reason,
                        "band": band.as_str(),
                        "gate_failed_reason": gate_reason,
                        "final_confidence": final_confidence,
                        "scores": {
                            "acceleration": scores.acceleration,
                            "intent": scores.intent,
                            "spread": scores.spread,
                        },
                        "scoring_version": SCORING_VERSION,
                    });
                    let result = sqlx::query(
                        r#"
                        INSERT INTO signal_events (kind, tag, brand, day, severity, payload)
                        VALUES (?, ?, ?, ?, ?, ?)
                        ON CONFLICT DO NOTHING
                        "#,
                    )
                    .bind(EventKind::WatchlistWarm.as_str())
                    .bind(&candidate.tag)
                    .bind(&candidate.brand)
                    .bind(&candidate.day)
                    .bind(Severity::Warning.as_str())
                    .bind(payload.to_string())
                    .execute(&self.db)
                    .await?;

                    if result.rows_affected() > 0 {
                        stats.warm_events += 1;
                    }
                }
            }
        }

        Ok(())
    }

    async fn persist_validation(&self, brand: &str, outcome: &TrendsOutcome) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trends_validations (
                brand, checked_at, search_interest, trend_direction,
                validates_signal, confidence_boost, validation_status, query_term, error
            )
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(brand)
        .bind(outcome.search_interest)
        .bind(outcome.direction.as_str())
        .bind(outcome.validates_signal)
        .bind(outcome.confidence_boost)
        .bind(outcome.status.as_str())
        .bind(&outcome.query_term)
        .bind(&outcome.error)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

//! Confidence scoring closed forms
//!
//! Five factor scores in [0,1], a weighted final score, hard gates, and
//! band classification. All pure; the runner wires them to the store.
//!
//! Factor maps are conservative piecewise-linear curves: a factor never
//! reads 0.0 just because a signal is young (the floor is 0.20), and never
//! reads 1.0 (the ceiling is 0.95) so no single factor can carry a score
//! alone.

pub mod runner;

use eva_common::config::{BandSettings, GateSettings};
use eva_common::db::models::Band;

pub const SCORING_VERSION: &str = "v1";

/// Factor weights. Intent is weighted highest; acceleration and spread
/// share second.
#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub intent: f64,
    pub acceleration: f64,
    pub spread: f64,
    pub baseline: f64,
    pub suppression: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            intent: 0.30,
            acceleration: 0.20,
            spread: 0.20,
            baseline: 0.15,
            suppression: 0.15,
        }
    }
}

/// The five factor scores for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorScores {
    pub acceleration: f64,
    pub intent: f64,
    pub spread: f64,
    pub baseline: f64,
    pub suppression: f64,
}

/// Gate + band classification outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub band: Band,
    pub final_confidence: f64,
    pub gate_failed_reason: Option<String>,
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Map a share-of-voice delta (percentage points vs yesterday) to an
/// acceleration score. Flat-or-falling reads 0.20; +2pp or more reads 0.95.
pub fn acceleration_from_delta(delta_pct: f64) -> f64 {
    if delta_pct <= 0.0 {
        return 0.20;
    }
    if delta_pct >= 2.0 {
        return 0.95;
    }
    clamp01(0.20 + (delta_pct / 2.0) * 0.75)
}

/// Map the action-intent rate to the intent factor. Piecewise-linear:
/// 0 -> 0.20, 0.20 -> 0.65, 0.50+ -> 0.95.
pub fn intent_from_action_rate(action_intent_rate: f64) -> f64 {
    let r = action_intent_rate.max(0.0);
    if r <= 0.0 {
        return 0.20;
    }
    if r >= 0.50 {
        return 0.95;
    }
    if r <= 0.20 {
        clamp01(0.20 + (r / 0.20) * 0.45)
    } else {
        clamp01(0.65 + ((r - 0.20) / 0.30) * 0.30)
    }
}

/// Cross-community breadth: one community scores 0, four or more score 1.
pub fn spread_from_counts(source_count: i64, platform_count: i64) -> f64 {
    let s = (source_count - 1).max(0) as f64 / 3.0;
    let p = (platform_count - 1).max(0) as f64 / 3.0;
    clamp01(s.max(p))
}

/// Persistence proxy from daily volume: a single message reads 0.20,
/// twenty or more read 0.95.
pub fn baseline_from_msg_count(msg_count: i64) -> f64 {
    let n = msg_count.max(0);
    if n <= 1 {
        return 0.20;
    }
    if n >= 20 {
        return 0.95;
    }
    clamp01(0.20 + (n as f64 / 20.0) * 0.75)
}

/// Suppression is the complement of meme risk.
pub fn suppression_from_meme_risk(meme_risk: f64) -> f64 {
    clamp01(1.0 - clamp01(meme_risk))
}

/// Weighted final score before gates.
pub fn weighted_final(scores: &FactorScores, w: &Weights) -> f64 {
    clamp01(
        scores.intent * w.intent
            + scores.acceleration * w.acceleration
            + scores.spread * w.spread
            + scores.baseline * w.baseline
            + scores.suppression * w.suppression,
    )
}

/// Apply hard gates and classify into a band.
///
/// Gates are strict `<` comparisons: a factor exactly at its threshold
/// passes. A failed gate forces SUPPRESSED with final 0 and a recorded
/// reason. Band promotion is `>=`.
pub fn classify(scores: &FactorScores, gates: &GateSettings, bands: &BandSettings) -> ScoreOutcome {
    if scores.intent < gates.intent {
        return ScoreOutcome {
            band: Band::Suppressed,
            final_confidence: 0.0,
            gate_failed_reason: Some(format!("GATE_INTENT_LT_{}", gates.intent)),
        };
    }
    if scores.suppression < gates.suppression {
        return ScoreOutcome {
            band: Band::Suppressed,
            final_confidence: 0.0,
            gate_failed_reason: Some(format!("GATE_SUPPRESSION_LT_{}", gates.suppression)),
        };
    }
    if scores.spread < gates.spread {
        return ScoreOutcome {
            band: Band::Suppressed,
            final_confidence: 0.0,
            gate_failed_reason: Some(format!("GATE_SPREAD_LT_{}", gates.spread)),
        };
    }

    let final_confidence = weighted_final(scores, &Weights::default());
    ScoreOutcome {
        band: band_for(final_confidence, bands),
        final_confidence,
        gate_failed_reason: None,
    }
}

/// Band for a final score. `>=` on both thresholds.
pub fn band_for(final_confidence: f64, bands: &BandSettings) -> Band {
    if final_confidence >= bands.high {
        Band::High
    } else if final_confidence >= bands.watchlist {
        Band::Watchlist
    } else {
        Band::Suppressed
    }
}

/// Conservative "warming up" detector: a non-HIGH candidate is worth a
/// watchlist breadcrumb only when at least one dimension is meaningfully
/// strong.
pub fn warm_reason(scores: &FactorScores) -> Option<&'static str> {
    if scores.spread >= 0.60 {
        return Some("WARM_SPREAD_GE_0.60");
    }
    if scores.acceleration >= 0.85 {
        return Some("WARM_ACCEL_GE_0.85");
    }
    if scores.intent >= 0.45 {
        return Some("WARM_INTENT_GE_0.45");
    }
    None
}

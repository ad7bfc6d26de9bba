//! Domain models and closed enums
//!
//! Enums persist as their lowercase (or SCREAMING, matching the band/state
//! conventions) string forms; every enum has a string round-trip so rows can
//! be decoded without panicking on unknown values.

use serde::{Deserialize, Serialize};

/// Sentiment of one processed post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    StrongPositive,
    Positive,
    Neutral,
    Negative,
    StrongNegative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::StrongPositive => "strong_positive",
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
            Sentiment::StrongNegative => "strong_negative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "strong_positive" => Some(Sentiment::StrongPositive),
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            "strong_negative" => Some(Sentiment::StrongNegative),
            _ => None,
        }
    }
}

/// Behavioral intent of one processed post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Buy,
    Own,
    Recommendation,
    Complaint,
    None,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Buy => "buy",
            Intent::Own => "own",
            Intent::Recommendation => "recommendation",
            Intent::Complaint => "complaint",
            Intent::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Intent::Buy),
            "own" => Some(Intent::Own),
            "recommendation" => Some(Intent::Recommendation),
            "complaint" => Some(Intent::Complaint),
            "none" => Some(Intent::None),
            _ => None,
        }
    }

    /// Action intents are the ones that count toward the intent factor.
    pub fn is_action(&self) -> bool {
        matches!(self, Intent::Buy | Intent::Own | Intent::Recommendation)
    }
}

/// Confidence band assigned by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    High,
    Watchlist,
    Suppressed,
}

impl Band {
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::High => "HIGH",
            Band::Watchlist => "WATCHLIST",
            Band::Suppressed => "SUPPRESSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HIGH" => Some(Band::High),
            "WATCHLIST" => Some(Band::Watchlist),
            "SUPPRESSED" => Some(Band::Suppressed),
            _ => None,
        }
    }
}

/// Kinds of emitted signal events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TagElevated,
    BrandDivergence,
    WatchlistWarm,
    RecommendationEligible,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TagElevated => "TAG_ELEVATED",
            EventKind::BrandDivergence => "BRAND_DIVERGENCE",
            EventKind::WatchlistWarm => "WATCHLIST_WARM",
            EventKind::RecommendationEligible => "RECOMMENDATION_ELIGIBLE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TAG_ELEVATED" => Some(EventKind::TagElevated),
            "BRAND_DIVERGENCE" => Some(EventKind::BrandDivergence),
            "WATCHLIST_WARM" => Some(EventKind::WatchlistWarm),
            "RECOMMENDATION_ELIGIBLE" => Some(EventKind::RecommendationEligible),
            _ => None,
        }
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Search-interest trend direction from the external validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Stable,
    Falling,
    Unknown,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Rising => "rising",
            TrendDirection::Stable => "stable",
            TrendDirection::Falling => "falling",
            TrendDirection::Unknown => "unknown",
        }
    }
}

/// Whether a validation completed or the provider was unreachable.
///
/// `Pending` must be treated as "no data" by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Completed,
    Pending,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Completed => "completed",
            ValidationStatus::Pending => "pending",
        }
    }
}

/// Tag-level behavior state. Transitions to `Elevated` latch until a later
/// scoring run decides otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    Normal,
    Elevated,
}

impl TagState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagState::Normal => "NORMAL",
            TagState::Elevated => "ELEVATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NORMAL" => Some(TagState::Normal),
            "ELEVATED" => Some(TagState::Elevated),
            _ => None,
        }
    }
}

/// Paper position status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::Closed => "closed",
        }
    }
}

/// Why a paper position was closed. Exactly one applies per close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    ProfitTarget,
    StopLoss,
    TimeExit,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::ProfitTarget => "profit_target",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TimeExit => "time_exit",
            ExitReason::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "profit_target" => Some(ExitReason::ProfitTarget),
            "stop_loss" => Some(ExitReason::StopLoss),
            "time_exit" => Some(ExitReason::TimeExit),
            "manual" => Some(ExitReason::Manual),
            _ => None,
        }
    }
}

/// One ingested post, exactly as admitted. Immutable after insert.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawPost {
    pub id: i64,
    pub source: String,
    pub platform_id: String,
    pub posted_at: String,
    pub body: String,
    pub url: Option<String>,
    /// JSON object as text; see [`RawPost::meta_value`].
    pub meta: String,
    pub processed: bool,
}

impl RawPost {
    pub fn meta_value(&self) -> serde_json::Value {
        serde_json::from_str(&self.meta).unwrap_or(serde_json::Value::Null)
    }
}

/// Structured extraction of one raw post.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProcessedPost {
    pub id: i64,
    pub raw_id: i64,
    /// JSON array of brand strings.
    pub brands: String,
    /// JSON array of behavior tags.
    pub tags: String,
    pub sentiment: String,
    pub intent: String,
    pub tickers: String,
    pub processor_version: String,
}

impl ProcessedPost {
    pub fn brand_list(&self) -> Vec<String> {
        serde_json::from_str(&self.brands).unwrap_or_default()
    }

    pub fn tag_list(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}

/// One emitted signal event.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SignalEvent {
    pub id: i64,
    pub kind: String,
    pub tag: String,
    pub brand: String,
    pub day: String,
    pub severity: String,
    pub payload: String,
    pub acknowledged: bool,
    pub created_at: String,
}

impl SignalEvent {
    pub fn payload_value(&self) -> serde_json::Value {
        serde_json::from_str(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// One persisted confidence score row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConfidenceScore {
    pub id: i64,
    pub day: String,
    pub brand: String,
    pub tag: String,
    pub scoring_version: String,
    pub acceleration_score: f64,
    pub intent_score: f64,
    pub spread_score: f64,
    pub baseline_score: f64,
    pub suppression_score: f64,
    pub final_confidence: f64,
    pub band: String,
    pub gate_failed_reason: Option<String>,
    pub details: String,
    pub computed_at: String,
}

/// One human-gated recommendation draft.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecommendationDraft {
    pub id: i64,
    pub signal_event_id: i64,
    pub brand: String,
    pub tag: String,
    pub event_time: String,
    pub final_confidence: Option<f64>,
    pub band: Option<String>,
    pub bundle_path: String,
    pub bundle_sha256: String,
    pub markdown_path: String,
    pub markdown_sha256: String,
    pub approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub notified_at: Option<String>,
    pub claimed_at: Option<String>,
    pub notify_attempts: i64,
    pub last_notify_error: Option<String>,
    pub created_at: String,
}

/// Brand to ticker mapping. Brand matching is case-insensitive.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandTicker {
    pub id: i64,
    pub brand: String,
    pub ticker: Option<String>,
    pub parent_company: Option<String>,
    pub material: bool,
    pub exchange: Option<String>,
    pub notes: Option<String>,
}

/// One simulated position for forward validation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaperPosition {
    pub id: i64,
    pub signal_event_id: i64,
    pub brand: String,
    pub tag: String,
    pub ticker: String,
    pub entry_date: String,
    pub entry_price: f64,
    pub current_price: Option<f64>,
    pub position_size: f64,
    pub status: String,
    pub exit_date: Option<String>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<String>,
    pub return_pct: Option<f64>,
    pub return_dollar: Option<f64>,
    pub days_held: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_strings() {
        for s in [
            Sentiment::StrongPositive,
            Sentiment::Positive,
            Sentiment::Neutral,
            Sentiment::Negative,
            Sentiment::StrongNegative,
        ] {
            assert_eq!(Sentiment::parse(s.as_str()), Some(s));
        }
        for i in [
            Intent::Buy,
            Intent::Own,
            Intent::Recommendation,
            Intent::Complaint,
            Intent::None,
        ] {
            assert_eq!(Intent::parse(i.as_str()), Some(i));
        }
        for b in [Band::High, Band::Watchlist, Band::Suppressed] {
            assert_eq!(Band::parse(b.as_str()), Some(b));
        }
        for k in [
            EventKind::TagElevated,
            EventKind::BrandDivergence,
            EventKind::WatchlistWarm,
            EventKind::RecommendationEligible,
        ] {
            assert_eq!(EventKind::parse(k.as_str()), Some(k));
        }
    }

    #[test]
    fn unknown_strings_do_not_parse() {
        assert_eq!(Sentiment::parse("ecstatic"), None);
        assert_eq!(Band::parse("high"), None);
        assert_eq!(ExitReason::parse("bored"), None);
    }

    #[test]
    fn action_intents() {
        assert!(Intent::Buy.is_action());
        assert!(Intent::Own.is_action());
        assert!(Intent::Recommendation.is_action());
        assert!(!Intent::Complaint.is_action());
        assert!(!Intent::None.is_action());
    }
}

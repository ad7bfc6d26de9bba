//! External search-interest validator
//!
//! Cross-checks a HIGH candidate against search behavior: fetches a 90-day
//! interest series for the brand, classifies the direction, and returns a
//! bounded confidence adjustment. The provider rate-limits aggressively, so
//! this module owns all of its own pacing state: a per-brand 24h cache, a
//! global inter-request delay, and exponential backoff with a session reset
//! between attempts. When retries are exhausted the result is `pending` and
//! the scorer must treat it as no data.

use eva_common::config::TrendsSettings;
use eva_common::db::models::{TrendDirection, ValidationStatus};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const IDENTITY_HEADER: &str = "eva-finance-validator/0.1 (signal cross-validation)";
const BACKOFF_INITIAL_SECS: u64 = 5;
const BACKOFF_CAP_SECS: u64 = 120;
const MAX_RETRIES: u32 = 3;

/// Maximum boost a validation can apply.
pub const BOOST_MAX: f64 = 0.15;
/// Maximum penalty a validation can apply.
pub const BOOST_MIN: f64 = -0.10;

/// Outcome of one validation attempt.
#[derive(Debug, Clone)]
pub struct TrendsOutcome {
    pub status: ValidationStatus,
    /// Normalized search interest in [0,1].
    pub search_interest: f64,
    pub direction: TrendDirection,
    pub validates_signal: bool,
    /// Bounded confidence adjustment in [-0.10, +0.15]. Zero when pending.
    pub confidence_boost: f64,
    pub query_term: String,
    pub error: Option<String>,
}

impl TrendsOutcome {
    fn pending(brand: &str, error: String) -> Self {
        Self {
            status: ValidationStatus::Pending,
            search_interest: 0.0,
            direction: TrendDirection::Unknown,
            validates_signal: false,
            confidence_boost: 0.0,
            query_term: brand.to_string(),
            error: Some(error),
        }
    }
}

struct CacheEntry {
    outcome: TrendsOutcome,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct InterestResponse {
    values: Vec<f64>,
}

pub struct TrendsValidator {
    cfg: TrendsSettings,
    cache: Mutex<HashMap<String, CacheEntry>>,
    last_request: Mutex<Option<Instant>>,
}

impl TrendsValidator {
    pub fn new(cfg: TrendsSettings) -> Self {
        Self {
            cfg,
            cache: Mutex::new(HashMap::new()),
            last_request: Mutex::new(None),
        }
    }

    /// Validate one brand. Infallible by design: provider trouble yields a
    /// `pending` outcome, never an error.
    pub async fn validate_brand(&self, brand: &str) -> TrendsOutcome {
        let key = brand.trim().to_lowercase();
        if key.is_empty() {
            return TrendsOutcome::pending(brand, "empty brand name".to_string());
        }

        {
            let mut cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if Instant::now() < entry.expires_at {
                    tracing::debug!(brand, "Validation cache hit");
                    return entry.outcome.clone();
                }
                cache.remove(&key);
            }
        }

        let outcome = match self.fetch_series(brand).await {
            Ok(values) => {
                let search_interest = interest_from_series(&values);
                let direction = direction_from_series(&values);
                let confidence_boost = boost_for(search_interest, direction);
                let validates_signal = validates(search_interest, direction);

                tracing::info!(
                    brand,
                    interest = search_interest,
                    direction = direction.as_str(),
                    boost = confidence_boost,
                    validates = validates_signal,
                    "Trends validation complete"
                );

                TrendsOutcome {
                    status: ValidationStatus::Completed,
                    search_interest,
                    direction,
                    validates_signal,
                    confidence_boost,
                    query_term: brand.to_string(),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(brand, error = %e, "Trends validation pending");
                TrendsOutcome::pending(brand, e)
            }
        };

        // Only completed outcomes are cached; pending ones should retry on
        // the next scoring run.
        if outcome.status == ValidationStatus::Completed {
            let mut cache = self.cache.lock().await;
            cache.insert(
                key,
                CacheEntry {
                    outcome: outcome.clone(),
                    expires_at: Instant::now() + Duration::from_secs(self.cfg.cache_hours * 3600),
                },
            );
        }

        outcome
    }

    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let min_interval = Duration::from_millis(self.cfg.min_request_delay_ms);
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Fetch the 90-day interest series with rate-limit discipline:
    /// backoff starts at 5s, doubles to a 120s cap, up to 3 retries, and a
    /// fresh connection per attempt.
    async fn fetch_series(&self, brand: &str) -> Result<Vec<f64>, String> {
        let url = format!(
            "{}/interest?term={}&days=90",
            self.cfg.base_url.trim_end_matches('/'),
            urlencode(brand)
        );

        let mut backoff_secs = BACKOFF_INITIAL_SECS;
        let mut last_error = String::new();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                tracing::warn!(
                    brand,
                    attempt,
                    backoff_secs,
                    "Trends provider backoff before retry"
                );
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                backoff_secs = (backoff_secs * 2).min(BACKOFF_CAP_SECS);
            }

            self.pace().await;

            // Session reset: a fresh client (and connection pool) per
            // attempt, with the custom identity header.
            let client = match reqwest::Client::builder()
                .user_agent(IDENTITY_HEADER)
                .timeout(Duration::from_secs(25))
                .build()
            {
                Ok(c) => c,
                Err(e) => return Err(format!("client build failed: {e}")),
            };

            match client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 429 || status.as_u16() == 503 {
                        last_error = format!("rate limited ({status})");
                        continue;
                    }
                    if !status.is_success() {
                        // Contract violations don't improve with retries.
                        return Err(format!("provider error {status}"));
                    }
                    match response.json::<InterestResponse>().await {
                        Ok(body) if !body.values.is_empty() => return Ok(body.values),
                        Ok(_) => return Err("empty interest series".to_string()),
                        Err(e) => return Err(format!("unparseable interest series: {e}")),
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_error = format!("transport: {e}");
                    continue;
                }
                Err(e) => return Err(format!("request failed: {e}")),
            }
        }

        Err(format!("retries exhausted: {last_error}"))
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                c.to_string()
            } else if c == ' ' {
                "+".to_string()
            } else {
                c.to_string()
                    .bytes()
                    .map(|b| format!("%{b:02X}"))
                    .collect()
            }
        })
        .collect()
}

/// Normalized recent interest: last-30-day mean over the full-period mean,
/// capped at 2x (= 1.0). Short series compare against themselves and read
/// as stable interest.
pub fn interest_from_series(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let full_avg = values.iter().sum::<f64>() / values.len() as f64;
    if full_avg <= 0.0 {
        return 0.0;
    }
    let recent = if values.len() < 30 {
        values
    } else {
        &values[values.len() - 30..]
    };
    let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;
    ((recent_avg / full_avg) / 2.0).clamp(0.0, 1.0)
}

/// Direction of the last 30 days against the prior 60: rising at +20% or
/// more, falling at -20% or less, unknown on short series.
pub fn direction_from_series(values: &[f64]) -> TrendDirection {
    if values.len() < 60 {
        return TrendDirection::Unknown;
    }
    let split = values.len() - 30;
    let last_30 = &values[split..];
    let prior = &values[..split];

    let last_avg = last_30.iter().sum::<f64>() / last_30.len() as f64;
    let prior_avg = prior.iter().sum::<f64>() / prior.len() as f64;
    if prior_avg <= 0.0 {
        return TrendDirection::Unknown;
    }

    let change_pct = (last_avg - prior_avg) / prior_avg * 100.0;
    if change_pct >= 20.0 {
        TrendDirection::Rising
    } else if change_pct <= -20.0 {
        TrendDirection::Falling
    } else {
        TrendDirection::Stable
    }
}

/// Bounded confidence adjustment. Low search interest is neutral: absence
/// of search visibility is not evidence against a social signal.
pub fn boost_for(search_interest: f64, direction: TrendDirection) -> f64 {
    if search_interest < 0.20 {
        return 0.0;
    }
    let boost = match direction {
        TrendDirection::Rising => (0.15 * search_interest).min(BOOST_MAX),
        TrendDirection::Stable => (0.05 * search_interest).min(0.05),
        TrendDirection::Falling => (-0.075 * search_interest).max(BOOST_MIN),
        TrendDirection::Unknown => 0.0,
    };
    boost.clamp(BOOST_MIN, BOOST_MAX)
}

/// Whether search behavior confirms the social signal. Conservative: only
/// a clear confirmation validates.
pub fn validates(search_interest: f64, direction: TrendDirection) -> bool {
    match direction {
        TrendDirection::Rising => search_interest >= 0.30,
        TrendDirection::Stable => search_interest >= 0.50,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(prior: f64, prior_days: usize, recent: f64, recent_days: usize) -> Vec<f64> {
        let mut v = vec![prior; prior_days];
        v.extend(std::iter::repeat(recent).take(recent_days));
        v
    }

    #[test]
    fn interest_is_half_when_recent_matches_average() {
        let v = vec![50.0; 90];
        assert!((interest_from_series(&v) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn interest_caps_at_double_the_average() {
        // Recent volume far above baseline saturates at 1.0.
        let v = series(1.0, 60, 100.0, 30);
        assert_eq!(interest_from_series(&v), 1.0);
    }

    #[test]
    fn zero_series_reads_zero_interest() {
        assert_eq!(interest_from_series(&[0.0; 90]), 0.0);
        assert_eq!(interest_from_series(&[]), 0.0);
    }

    #[test]
    fn direction_thresholds_at_twenty_percent() {
        assert_eq!(
            direction_from_series(&series(50.0, 60, 61.0, 30)),
            TrendDirection::Rising
        );
        assert_eq!(
            direction_from_series(&series(50.0, 60, 39.0, 30)),
            TrendDirection::Falling
        );
        assert_eq!(
            direction_from_series(&series(50.0, 60, 55.0, 30)),
            TrendDirection::Stable
        );
    }

    #[test]
    fn short_series_read_unknown() {
        assert_eq!(direction_from_series(&[5.0; 59]), TrendDirection::Unknown);
    }

    #[test]
    fn boost_scales_with_interest_and_stays_bounded() {
        assert!((boost_for(1.0, TrendDirection::Rising) - 0.15).abs() < 1e-9);
        assert!((boost_for(0.5, TrendDirection::Rising) - 0.075).abs() < 1e-9);
        assert!((boost_for(1.0, TrendDirection::Stable) - 0.05).abs() < 1e-9);
        assert!((boost_for(1.0, TrendDirection::Falling) + 0.075).abs() < 1e-9);
        assert_eq!(boost_for(1.0, TrendDirection::Unknown), 0.0);

        for interest in [0.0, 0.2, 0.5, 0.8, 1.0] {
            for direction in [
                TrendDirection::Rising,
                TrendDirection::Stable,
                TrendDirection::Falling,
                TrendDirection::Unknown,
            ] {
                let b = boost_for(interest, direction);
                assert!((BOOST_MIN..=BOOST_MAX).contains(&b));
            }
        }
    }

    #[test]
    fn low_interest_is_neutral_even_when_falling() {
        assert_eq!(boost_for(0.1, TrendDirection::Falling), 0.0);
        assert_eq!(boost_for(0.19, TrendDirection::Rising), 0.0);
    }

    #[test]
    fn validation_verdict_is_conservative() {
        assert!(validates(0.30, TrendDirection::Rising));
        assert!(!validates(0.29, TrendDirection::Rising));
        assert!(validates(0.50, TrendDirection::Stable));
        assert!(!validates(0.49, TrendDirection::Stable));
        assert!(!validates(0.99, TrendDirection::Falling));
        assert!(!validates(0.99, TrendDirection::Unknown));
    }

    #[test]
    fn pending_outcome_is_neutral() {
        let p = TrendsOutcome::pending("Hoka", "retries exhausted".to_string());
        assert_eq!(p.status, ValidationStatus::Pending);
        assert_eq!(p.confidence_boost, 0.0);
        assert!(!p.validates_signal);
    }
}

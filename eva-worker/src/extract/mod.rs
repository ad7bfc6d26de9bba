//! Structured entity extraction
//!
//! Two implementations of the same capability: a model-backed primary path
//! and a pure heuristic fallback. The strategy tries the primary and falls
//! back on any failure, then applies the comparative-enforcement layer to
//! whichever result it got. Extraction as a whole never fails; the worst
//! case is an empty result from the fallback.

mod enforce;
mod heuristic;
mod llm;

pub use heuristic::HeuristicExtractor;
pub use llm::LlmExtractor;

use async_trait::async_trait;
use eva_common::db::models::{Intent, Sentiment};

/// Structured output of one extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// All brands explicitly mentioned.
    pub brands: Vec<String>,
    /// Behavior tags (what people do, not what they bought).
    pub tags: Vec<String>,
    pub sentiment: Sentiment,
    pub intent: Intent,
    pub tickers: Vec<String>,
    /// Which path produced this row, e.g. `llm:gpt-4o-mini:v1` or
    /// `fallback:v1`.
    pub processor_version: String,
}

impl ExtractionResult {
    pub fn empty(processor_version: String) -> Self {
        Self {
            brands: Vec::new(),
            tags: Vec::new(),
            sentiment: Sentiment::Neutral,
            intent: Intent::None,
            tickers: Vec::new(),
            processor_version,
        }
    }
}

/// The extraction capability. Implementations may fail; the strategy
/// guarantees a total result.
#[async_trait]
pub trait Extract: Send + Sync {
    async fn extract(&self, text: &str) -> eva_common::Result<ExtractionResult>;
}

/// Primary-then-fallback extraction with post-hoc enforcement.
pub struct ExtractionStrategy {
    primary: Option<LlmExtractor>,
    fallback: HeuristicExtractor,
}

impl ExtractionStrategy {
    pub fn new(primary: Option<LlmExtractor>) -> Self {
        Self {
            primary,
            fallback: HeuristicExtractor::new(),
        }
    }

    /// Extract structured entities from one post body. Never fails.
    pub async fn extract(&self, text: &str) -> ExtractionResult {
        let mut result = match &self.primary {
            Some(primary) => match primary.extract(text).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "Primary extraction failed, using fallback");
                    self.fallback.extract_sync(text)
                }
            },
            None => self.fallback.extract_sync(text),
        };

        enforce::apply(text, &mut result);
        result
    }
}

/// Case-insensitive phrase containment on word boundaries.
///
/// `haystack_lower` must already be lowercased.
pub(crate) fn contains_phrase(haystack_lower: &str, phrase: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack_lower[start..].find(phrase) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !haystack_lower[..abs]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after = abs + phrase.len();
        let after_ok = after >= haystack_lower.len()
            || !haystack_lower[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = abs + 1;
        if start >= haystack_lower.len() {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrase_matching_respects_word_boundaries() {
        assert!(contains_phrase("i love my hoka shoes", "hoka"));
        assert!(contains_phrase("hoka is great", "hoka"));
        assert!(!contains_phrase("hokage is an anime rank", "hoka"));
        assert!(!contains_phrase("shokai meeting", "hoka"));
        assert!(contains_phrase("switched to on running lately", "on running"));
    }

    #[tokio::test]
    async fn strategy_without_primary_is_total() {
        let strategy = ExtractionStrategy::new(None);
        let result = strategy.extract("").await;
        assert_eq!(result.processor_version, "fallback:v1");
        assert!(result.brands.is_empty());
        assert_eq!(result.intent, Intent::None);
    }
}

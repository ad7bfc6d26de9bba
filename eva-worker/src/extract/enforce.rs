//! Post-extraction enforcement layer
//!
//! Applied to every extraction result, model-backed or heuristic. The
//! multi-brand comparative contract is authoritative: when two or more
//! brands appear alongside switch or comparative language, the row carries
//! the `brand-switch` tag and an ownership intent regardless of what the
//! extractor said.

use super::ExtractionResult;
use eva_common::db::models::{Intent, Sentiment};

const MAX_TAGS: usize = 5;

const SWITCH_SIGNALS: &[&str] = &[
    "switching from",
    "switched from",
    "switched",
    "moving from",
    "moved from",
    "done with",
    "never going back",
    "i'm done with",
    "im done with",
    "ditching",
    "replacing",
    "instead of",
];

const COMPARATIVE_SIGNALS: &[&str] = &[
    "better than",
    "worse than",
    "more comfortable than",
    "less comfortable than",
    "not even close",
    "beats",
    "crushes",
    "smokes",
    "blows",
];

const STRONG_POS_SIGNALS: &[&str] = &[
    "love",
    "amazing",
    "insane",
    "never going back",
    "so much better",
    "obsessed",
];
const STRONG_NEG_SIGNALS: &[&str] = &["hate", "trash", "awful", "terrible", "never again", "done with"];

const PURCHASE_VERBS: &[&str] = &["bought", "buying", "ordered", "just picked up", "purchased"];

fn ensure(tags: &mut Vec<String>, value: &str) {
    if !tags.iter().any(|t| t == value) {
        tags.push(value.to_string());
    }
}

/// Normalize and enforce invariants on an extraction result, in place.
pub fn apply(text: &str, result: &mut ExtractionResult) {
    let lower = text.to_lowercase();

    let is_switchy = SWITCH_SIGNALS.iter().any(|s| lower.contains(s));
    let is_comparative = COMPARATIVE_SIGNALS.iter().any(|s| lower.contains(s));

    // Multi-brand comparative contract.
    if result.brands.len() >= 2 && (is_switchy || is_comparative) {
        ensure(&mut result.tags, "brand-switch");
        result.intent = if PURCHASE_VERBS.iter().any(|v| lower.contains(v)) {
            Intent::Buy
        } else {
            Intent::Own
        };
    }

    // Clearly comparative text is never neutral.
    if result.sentiment == Sentiment::Neutral && (is_switchy || is_comparative) {
        result.sentiment = if STRONG_NEG_SIGNALS.iter().any(|s| lower.contains(s)) {
            Sentiment::StrongNegative
        } else if STRONG_POS_SIGNALS.iter().any(|s| lower.contains(s)) {
            Sentiment::StrongPositive
        } else {
            Sentiment::Positive
        };
    }

    // A brand-switch row always carries a real intent and sentiment.
    if result.tags.iter().any(|t| t == "brand-switch") {
        if result.intent == Intent::None {
            result.intent = Intent::Own;
        }
        if result.sentiment == Sentiment::Neutral {
            result.sentiment = Sentiment::Positive;
        }
    }

    // Overlapping comfort tags: keep the more specific one.
    if result.tags.iter().any(|t| t == "comfort") && result.tags.iter().any(|t| t == "comfort-shoes")
    {
        result.tags.retain(|t| t != "comfort");
    }

    dedupe(&mut result.brands);
    dedupe(&mut result.tags);
    dedupe(&mut result.tickers);
    result.tags.truncate(MAX_TAGS);
}

fn dedupe(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    values.retain(|v| seen.insert(v.to_lowercase()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(brands: &[&str], tags: &[&str]) -> ExtractionResult {
        ExtractionResult {
            brands: brands.iter().map(|s| s.to_string()).collect(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            sentiment: Sentiment::Neutral,
            intent: Intent::None,
            tickers: Vec::new(),
            processor_version: "test".to_string(),
        }
    }

    #[test]
    fn two_brands_with_switch_language_enforce_the_contract() {
        let mut r = result_with(&["Nike", "Hoka"], &[]);
        apply("Switched from Nike to Hoka last month", &mut r);

        assert!(r.tags.iter().any(|t| t == "brand-switch"));
        assert_eq!(r.intent, Intent::Own);
        assert_ne!(r.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn purchase_verb_dominates_switch_intent() {
        let mut r = result_with(&["Nike", "Hoka"], &[]);
        apply("Done with Nike, just picked up Hokas instead", &mut r);
        assert_eq!(r.intent, Intent::Buy);
    }

    #[test]
    fn single_brand_switch_language_is_not_a_brand_switch() {
        let mut r = result_with(&["Hoka"], &[]);
        apply("Never going back, these are great", &mut r);
        assert!(!r.tags.iter().any(|t| t == "brand-switch"));
    }

    #[test]
    fn comparative_language_upgrades_neutral_sentiment() {
        let mut r = result_with(&["Hoka", "Nike"], &[]);
        apply("Hoka is way more comfortable than Nike, love them", &mut r);
        assert_eq!(r.sentiment, Sentiment::StrongPositive);
    }

    #[test]
    fn comfort_tag_collapses_to_the_specific_one() {
        let mut r = result_with(&[], &["comfort", "comfort-shoes", "running"]);
        apply("so comfortable for running in these shoes", &mut r);
        assert!(!r.tags.iter().any(|t| t == "comfort"));
        assert!(r.tags.iter().any(|t| t == "comfort-shoes"));
    }

    #[test]
    fn tags_are_deduped_and_capped() {
        let mut r = result_with(&[], &["a", "A", "b", "c", "d", "e", "f"]);
        apply("plain text", &mut r);
        assert_eq!(r.tags.len(), MAX_TAGS);
        assert_eq!(r.tags[0], "a");
        assert!(!r.tags.contains(&"A".to_string()));
    }
}

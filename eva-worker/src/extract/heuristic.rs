//! Deterministic fallback extractor
//!
//! A pure, total function over the post text: brand detection against a
//! known vocabulary, behavior tags by lexicon, sentiment by polarity word
//! lists, intent by keyword class. It exists so the pipeline never blocks
//! on the model provider; when in doubt it extracts nothing.

use super::{contains_phrase, Extract, ExtractionResult};
use async_trait::async_trait;
use eva_common::db::models::{Intent, Sentiment};

pub const FALLBACK_VERSION: &str = "fallback:v1";

/// Known consumer brand vocabulary: lowercase phrase to canonical name.
///
/// Deliberately small; the model path carries the open-ended cases. New
/// brands surface through the model path and land in the ticker map for
/// operator review.
const BRAND_VOCABULARY: &[(&str, &str)] = &[
    ("nike", "Nike"),
    ("adidas", "Adidas"),
    ("hoka", "Hoka"),
    ("on running", "On Running"),
    ("lululemon", "Lululemon"),
    ("crocs", "Crocs"),
    ("yeti", "Yeti"),
    ("duluth trading", "Duluth Trading"),
    ("allbirds", "Allbirds"),
    ("ugg", "Ugg"),
    ("teva", "Teva"),
    ("columbia", "Columbia"),
    ("north face", "North Face"),
    ("vans", "Vans"),
    ("timberland", "Timberland"),
    ("patagonia", "Patagonia"),
    ("arcteryx", "Arcteryx"),
    ("arc'teryx", "Arcteryx"),
    ("salomon", "Salomon"),
    ("brooks", "Brooks"),
    ("new balance", "New Balance"),
    ("carhartt", "Carhartt"),
];

const RUNNING_WORDS: &[&str] = &["run", "running", "runner", "runners"];
const COMFORT_WORDS: &[&str] = &["comfort", "comfortable", "comfy"];
const FOOTWEAR_WORDS: &[&str] = &["shoe", "shoes", "sneaker", "sneakers", "boots"];

const SWITCH_CUES: &[&str] = &[
    "switching from",
    "switched from",
    "switched to",
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

const STRONG_POSITIVE_WORDS: &[&str] = &[
    "love",
    "amazing",
    "insane",
    "way better",
    "never going back",
    "so much better",
    "obsessed",
];
const POSITIVE_WORDS: &[&str] = &["great", "solid", "happy with", "recommend", "better"];
const STRONG_NEGATIVE_WORDS: &[&str] = &["hate", "trash", "awful", "terrible", "never again"];
const NEGATIVE_WORDS: &[&str] = &["disappointed", "worse", "fell apart", "uncomfortable"];

const PURCHASE_VERBS: &[&str] = &["bought", "buying", "ordered", "just picked up", "purchased"];
const OWNERSHIP_VERBS: &[&str] = &["i own", "i use", "i wear", "i've been using", "been wearing"];
const RECOMMENDATION_CUES: &[&str] = &["you should", "highly recommend", "must try", "go get"];
const COMPLAINT_CUES: &[&str] = &["broke after", "fell apart", "returned it", "refund", "warranty claim"];

/// The deterministic fallback extractor. Stateless and pure.
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Pure extraction; total over all inputs.
    pub fn extract_sync(&self, text: &str) -> ExtractionResult {
        let lower = text.to_lowercase();
        let mut result = ExtractionResult::empty(FALLBACK_VERSION.to_string());

        for (phrase, canonical) in BRAND_VOCABULARY {
            if contains_phrase(&lower, phrase) && !result.brands.iter().any(|b| b == canonical) {
                result.brands.push((*canonical).to_string());
            }
        }

        if RUNNING_WORDS.iter().any(|w| contains_phrase(&lower, w)) {
            result.tags.push("running".to_string());
        }
        if COMFORT_WORDS.iter().any(|w| contains_phrase(&lower, w)) {
            result.tags.push("comfort".to_string());
            let footwear_context = result.tags.iter().any(|t| t == "running")
                || FOOTWEAR_WORDS.iter().any(|w| contains_phrase(&lower, w));
            if footwear_context {
                result.tags.push("comfort-shoes".to_string());
            }
        }
        if SWITCH_CUES.iter().any(|c| lower.contains(c)) {
            result.tags.push("brand-switch".to_string());
            result.intent = Intent::Own;
        }

        result.sentiment = if STRONG_POSITIVE_WORDS.iter().any(|w| lower.contains(w)) {
            Sentiment::StrongPositive
        } else if STRONG_NEGATIVE_WORDS.iter().any(|w| lower.contains(w)) {
            Sentiment::StrongNegative
        } else if POSITIVE_WORDS.iter().any(|w| lower.contains(w)) {
            Sentiment::Positive
        } else if NEGATIVE_WORDS.iter().any(|w| lower.contains(w)) {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };

        if result.intent == Intent::None {
            result.intent = if PURCHASE_VERBS.iter().any(|c| lower.contains(c)) {
                Intent::Buy
            } else if RECOMMENDATION_CUES.iter().any(|c| lower.contains(c)) {
                if result.sentiment == Sentiment::Neutral {
                    result.sentiment = Sentiment::Positive;
                }
                Intent::Recommendation
            } else if OWNERSHIP_VERBS.iter().any(|c| lower.contains(c)) {
                Intent::Own
            } else if COMPLAINT_CUES.iter().any(|c| lower.contains(c)) {
                Intent::Complaint
            } else {
                Intent::None
            };
        }

        result
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extract for HeuristicExtractor {
    async fn extract(&self, text: &str) -> eva_common::Result<ExtractionResult> {
        Ok(self.extract_sync(text))
    }
}

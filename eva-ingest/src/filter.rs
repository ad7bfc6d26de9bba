//! Post filtering and envelope normalization
//!
//! Conservative filtering: only textual posts with real content make it
//! into the pipeline. False negatives are preferred over false positives.

use crate::feed::FeedPost;
use chrono::{DateTime, Utc};
use eva_common::api::Envelope;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Minimum body length for a post to be worth extracting.
const MIN_TEXT_LEN: usize = 10;

/// Placeholder bodies left behind by moderation.
const REMOVED_PLACEHOLDERS: &[&str] = &["[removed]", "[deleted]"];

/// Whether a feed post is a valid text post with real content.
///
/// Rejects empty and link-only posts, moderation placeholders, and bodies
/// shorter than the minimum.
pub fn is_valid_text_post(post: &FeedPost) -> bool {
    let selftext = post.selftext.trim();

    if selftext.is_empty() {
        return false;
    }
    if REMOVED_PLACEHOLDERS.contains(&selftext) {
        return false;
    }
    if selftext.len() < MIN_TEXT_LEN {
        return false;
    }

    true
}

/// Hash an author name so no raw identity enters the store.
pub fn author_hash(author: &str) -> String {
    let digest = Sha256::digest(author.as_bytes());
    // Truncated hex is plenty for correlation and keeps meta compact.
    hex_prefix(digest.as_slice(), 8)
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().take(n).map(|b| format!("{b:02x}")).collect()
}

/// Convert a valid feed post into the admission envelope.
///
/// `platform_id` is `reddit_post_<id>`; the text combines title and body
/// for extraction context; the author is stored only as a hash.
pub fn normalize(post: &FeedPost, community: &str) -> Envelope {
    let title = post.title.trim();
    let selftext = post.selftext.trim();
    let full_text = format!("{title}\n\n{selftext}");

    let timestamp = DateTime::<Utc>::from_timestamp(post.created_utc as i64, 0)
        .unwrap_or_else(Utc::now)
        .to_rfc3339();

    let url = if post.permalink.is_empty() {
        None
    } else {
        Some(format!("https://www.reddit.com{}", post.permalink))
    };

    let mut meta = BTreeMap::new();
    meta.insert("community".to_string(), serde_json::json!(community));
    meta.insert("original_id".to_string(), serde_json::json!(post.id));
    if !post.author.is_empty() {
        meta.insert(
            "author_hash".to_string(),
            serde_json::json!(author_hash(&post.author)),
        );
    }

    Envelope {
        source: "reddit".to_string(),
        platform_id: format!("reddit_post_{}", post.id),
        timestamp,
        text: full_text,
        url,
        meta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(selftext: &str) -> FeedPost {
        FeedPost {
            id: "abc123".to_string(),
            title: "A title".to_string(),
            selftext: selftext.to_string(),
            author: "someone".to_string(),
            created_utc: 1_750_000_000.0,
            permalink: "/r/running/comments/abc123/a_title/".to_string(),
        }
    }

    #[test]
    fn accepts_real_text_posts() {
        assert!(is_valid_text_post(&post(
            "Switched from Nike to Hoka and my knees thank me."
        )));
    }

    #[test]
    fn rejects_empty_and_link_only() {
        assert!(!is_valid_text_post(&post("")));
        assert!(!is_valid_text_post(&post("   ")));
    }

    #[test]
    fn rejects_moderation_placeholders() {
        assert!(!is_valid_text_post(&post("[removed]")));
        assert!(!is_valid_text_post(&post("[deleted]")));
    }

    #[test]
    fn rejects_too_short_bodies() {
        assert!(!is_valid_text_post(&post("ok nice")));
    }

    #[test]
    fn normalize_builds_the_envelope_contract() {
        let envelope = normalize(&post("Long enough body text here."), "running");

        assert_eq!(envelope.source, "reddit");
        assert_eq!(envelope.platform_id, "reddit_post_abc123");
        assert!(envelope.text.starts_with("A title\n\n"));
        assert!(envelope.url.as_deref().unwrap().contains("/r/running/"));
        assert_eq!(envelope.meta["community"], "running");
        assert_eq!(envelope.meta["original_id"], "abc123");
        // Author never appears raw.
        let meta_json = serde_json::to_string(&envelope.meta).unwrap();
        assert!(!meta_json.contains("someone"));
        assert!(envelope.meta.contains_key("author_hash"));
    }

    #[test]
    fn author_hash_is_stable_and_opaque() {
        let a = author_hash("runner_42");
        let b = author_hash("runner_42");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, "runner_42");
    }
}

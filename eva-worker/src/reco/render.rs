//! Markdown draft rendering
//!
//! The draft is designed to be calm and auditable: YAML front matter
//! carries ids and content hashes for post-mortems, AUTO sections are
//! machine-filled, HUMAN sections stay as placeholders until an operator
//! writes them.

use super::sanitize::{clip, sanitize_text};

pub const MAX_EXCERPTS: usize = 15;
pub const MAX_EXCERPT_CHARS: usize = 400;

/// Everything the renderer needs, already resolved by the builder.
pub struct RenderContext<'a> {
    pub generated_at: &'a str,
    pub event_id: i64,
    pub event_kind: &'a str,
    pub event_time: &'a str,
    pub brand: &'a str,
    pub tag: &'a str,
    pub brand_slug: &'a str,
    pub window_start: &'a str,
    pub window_end: &'a str,
    pub bundle_path: &'a str,
    pub bundle_sha256: &'a str,
    pub confidence: Option<f64>,
    pub band: Option<&'a str>,
    pub snapshot_id: Option<i64>,
    pub evidence: &'a [EvidenceExcerpt],
}

/// One sanitized evidence excerpt for display.
pub struct EvidenceExcerpt {
    pub processed_id: i64,
    pub community: String,
    pub posted_at: String,
    pub text: String,
    pub intent: String,
    pub sentiment: String,
}

fn yaml_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

fn fmt_opt_f64(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.4}")).unwrap_or_else(|| "UNKNOWN".to_string())
}

/// Render the recommendation markdown artifact.
pub fn render_markdown(ctx: &RenderContext<'_>) -> String {
    let mut excerpts_md = String::new();
    for item in ctx.evidence.iter().take(MAX_EXCERPTS) {
        let safe = clip(&sanitize_text(&item.text), MAX_EXCERPT_CHARS);
        excerpts_md.push_str(&format!(
            "- `#{} | {} | {}`\n  > {}\n  *Intent:* {} | *Sentiment:* {}\n",
            item.processed_id,
            item.community,
            item.posted_at,
            safe.replace('\n', " "),
            item.intent,
            item.sentiment,
        ));
    }
    if excerpts_md.is_empty() {
        excerpts_md.push_str("- (No evidence items selected)\n");
    }

    let front_matter = format!(
        r#"---
schema: eva-finance-recommendation
schema_version: v1.0
generated_at: {generated_at}

anchor:
  signal_event_id: {event_id}
  event_kind: {event_kind}
  event_time: {event_time}

entity:
  brand: {brand}
  tag: {tag}
  slug: {slug}

source_window:
  start: {window_start}
  end: {window_end}

evidence:
  bundle_path: {bundle_path}
  bundle_sha256: {bundle_sha}
  excerpt_policy:
    max_excerpts: {max_excerpts}
    max_chars_each: {max_chars}
    sanitize_usernames: true
    sanitize_urls: true

reproducibility:
  generator:
    component: eva-worker
    version: {version}
  confidence_snapshot_id: {snapshot_id}
---
"#,
        generated_at = ctx.generated_at,
        event_id = ctx.event_id,
        event_kind = yaml_quote(ctx.event_kind),
        event_time = yaml_quote(ctx.event_time),
        brand = yaml_quote(ctx.brand),
        tag = yaml_quote(ctx.tag),
        slug = yaml_quote(ctx.brand_slug),
        window_start = yaml_quote(ctx.window_start),
        window_end = yaml_quote(ctx.window_end),
        bundle_path = yaml_quote(ctx.bundle_path),
        bundle_sha = yaml_quote(ctx.bundle_sha256),
        max_excerpts = MAX_EXCERPTS,
        max_chars = MAX_EXCERPT_CHARS,
        version = yaml_quote(env!("CARGO_PKG_VERSION")),
        snapshot_id = ctx
            .snapshot_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "null".to_string()),
    );

    let body = format!(
        r#"
# Recommendation Draft

---

## 1. Executive Assessment

**Recommendation:** Candidate for upward trajectory
**Confidence Level:** {confidence}
**Signal Band:** {band}
**Signal Date:** {event_day}

**Summary (AUTO):**
- Threshold crossing detected for **{brand}** within the `{tag}` behavior.
- Evidence bundle archived for post-mortem integrity (see front matter).
- This is a pattern snapshot, not advice.

---

## 2. Why This Company (HUMAN)

**Core Thesis (Plain Language):**
[Write your thesis here.]

---

## 3. Why Now (Timing Justification)

**Interpretation (AUTO):**
- Reference the snapshot deltas, spread, and intent progression.
- If this cannot be written clearly, the recommendation should not exist.

---

## 4. Signal Evidence

### Evidence Excerpts (AUTO, sanitized)
{excerpts}
---

## 5. Risks & Disconfirming Signals

**Known Risks (HUMAN):**
- [Add risks here.]

**Signals That Would Weaken This Recommendation (AUTO):**
- Intent regression (action language fading back to evaluation)
- Volume spike without sentiment stabilization
- Single-community concentration

---

## 6. Confidence Interpretation

**Confidence Score:** {confidence}

The score reflects confidence that the pattern is materially different from
noise, not certainty of outcome.

---

## 7. Post-Recommendation Tracking

**Review Windows:** 30 days, 90 days, 180 days
**Post-Mortem Required:** Yes
**Outcome Classification:** Pending

---

## 8. Final Note

Recommendations are issued infrequently by design. This artifact records a
threshold crossing, not a verdict.
"#,
        confidence = fmt_opt_f64(ctx.confidence),
        band = ctx.band.unwrap_or("UNKNOWN"),
        event_day = &ctx.event_time[..ctx.event_time.len().min(10)],
        brand = ctx.brand,
        tag = ctx.tag,
        excerpts = excerpts_md,
    );

    format!("{}{}", front_matter, body).trim().to_string() + "\n"
}

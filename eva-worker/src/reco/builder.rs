//! Evidence bundle and draft registration
//!
//! Bundles are content-addressed by the SHA-256 of their uncompressed
//! canonical JSON, written gzipped, and never rewritten in place. Draft
//! rows are keyed by the triggering event id; re-running over an unchanged
//! event set is a no-op.

use super::render::{render_markdown, EvidenceExcerpt, RenderContext, MAX_EXCERPTS, MAX_EXCERPT_CHARS};
use super::sanitize::{clip, sanitize_text};
use chrono::NaiveDate;
use eva_common::db::models::{ConfidenceScore, EventKind, SignalEvent};
use eva_common::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::scoring::SCORING_VERSION;

/// Days of evidence included before the event day.
const EVIDENCE_WINDOW_DAYS: i64 = 7;
/// Snapshot search half-width around the event day.
const SNAPSHOT_WINDOW_DAYS: i64 = 2;

pub struct RecommendationBuilder {
    db: SqlitePool,
    output_root: PathBuf,
}

impl RecommendationBuilder {
    pub fn new(db: SqlitePool, output_root: PathBuf) -> Self {
        Self { db, output_root }
    }

    /// Build artifacts and register a draft for every eligible event that
    /// doesn't have one yet. Returns how many drafts were registered.
    pub async fn build_pending(&self) -> Result<usize> {
        let pending = sqlx::query_as::<_, SignalEvent>(
            r#"
            SELECT se.id, se.kind, se.tag, se.brand, se.day, se.severity, se.payload,
                   se.acknowledged, se.created_at
            FROM signal_events se
            LEFT JOIN recommendation_drafts rd ON rd.signal_event_id = se.id
            WHERE se.kind = ? AND rd.signal_event_id IS NULL
            ORDER BY se.created_at ASC
            "#,
        )
        .bind(EventKind::RecommendationEligible.as_str())
        .fetch_all(&self.db)
        .await?;

        let mut registered = 0;
        for event in pending {
            match self.build_for_event(&event).await {
                Ok(true) => registered += 1,
                Ok(false) => {}
                Err(e) => {
                    // One bad event must not block the rest of the queue.
                    tracing::error!(event_id = event.id, error = %e, "Draft build failed");
                }
            }
        }

        Ok(registered)
    }

    /// Build both artifacts for one event and register the draft.
    /// Returns false when another worker registered it first.
    pub async fn build_for_event(&self, event: &SignalEvent) -> Result<bool> {
        if event.brand.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "event {} has no brand; not buildable",
                event.id
            )));
        }

        let event_day = NaiveDate::parse_from_str(&event.day, "%Y-%m-%d")
            .map_err(|e| Error::InvalidInput(format!("event {} day unparseable: {e}", event.id)))?;

        let snapshot = self.select_snapshot(&event.brand, &event.tag, event_day).await?;
        let excerpts = self.fetch_evidence(&event.brand, event_day).await?;

        let window_start = (event_day - chrono::Duration::days(EVIDENCE_WINDOW_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        let window_end = event.day.clone();

        let slug = slugify(&event.brand);
        let out_dir = self.output_root.join(&slug);
        std::fs::create_dir_all(&out_dir)?;

        let bundle_path = out_dir.join(format!("{}_evidence.json.gz", event.id));
        let markdown_path = out_dir.join(format!("{}_recommendation.md", event.id));
        ensure_append_only(&bundle_path)?;
        ensure_append_only(&markdown_path)?;

        let bundle = serde_json::json!({
            "schema": "eva-finance-evidence-bundle",
            "schema_version": "v1.0",
            "anchor": {
                "signal_event_id": event.id,
                "event_kind": event.kind,
                "day": event.day,
                "brand": event.brand,
                "tag": event.tag,
                "severity": event.severity,
                "payload": event.payload_value(),
            },
            "source_window": { "start": window_start, "end": window_end },
            "confidence_snapshot": snapshot.as_ref().map(|s| serde_json::json!({
                "id": s.id,
                "day": s.day,
                "tag": s.tag,
                "final_confidence": s.final_confidence,
                "band": s.band,
                "scoring_version": s.scoring_version,
                "computed_at": s.computed_at,
            })),
            "evidence_items": excerpts.iter().map(|e| serde_json::json!({
                "processed_id": e.processed_id,
                "community": e.community,
                "posted_at": e.posted_at,
                "text": e.text,
                "intent": e.intent,
                "sentiment": e.sentiment,
            })).collect::<Vec<_>>(),
            "generator": { "component": "eva-worker", "version": env!("CARGO_PKG_VERSION") },
        });

        let bundle_sha = write_bundle(&bundle_path, &bundle)?;
        let bundle_path_str = bundle_path.display().to_string();
        let markdown_path_str = markdown_path.display().to_string();

        let generated_at = chrono::Utc::now().to_rfc3339();
        let event_time = &event.created_at;
        let markdown = render_markdown(&RenderContext {
            generated_at: &generated_at,
            event_id: event.id,
            event_kind: &event.kind,
            event_time,
            brand: &event.brand,
            tag: &event.tag,
            brand_slug: &slug,
            window_start: &window_start,
            window_end: &window_end,
            bundle_path: &bundle_path_str,
            bundle_sha256: &bundle_sha,
            confidence: snapshot.as_ref().map(|s| s.final_confidence),
            band: snapshot.as_ref().map(|s| s.band.as_str()),
            snapshot_id: snapshot.as_ref().map(|s| s.id),
            evidence: &excerpts,
        });
        let markdown_sha = sha256_hex(markdown.as_bytes());
        std::fs::write(&markdown_path, &markdown)?;

        let result = sqlx::query(
            r#"
            INSERT INTO recommendation_drafts (
                signal_event_id, brand, tag, event_time,
                final_confidence, band,
                bundle_path, bundle_sha256, markdown_path, markdown_sha256
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (signal_event_id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(&event.brand)
        .bind(&event.tag)
        .bind(event_time)
        .bind(snapshot.as_ref().map(|s| s.final_confidence))
        .bind(snapshot.as_ref().map(|s| s.band.clone()))
        .bind(&bundle_path_str)
        .bind(&bundle_sha)
        .bind(&markdown_path_str)
        .bind(&markdown_sha)
        .execute(&self.db)
        .await?;

        let registered = result.rows_affected() > 0;
        if registered {
            tracing::info!(
                event_id = event.id,
                brand = %event.brand,
                bundle = %bundle_path.display(),
                sha = %bundle_sha,
                "Draft registered"
            );
        }
        Ok(registered)
    }

    /// Best confidence snapshot within ±2 days of the event: exact tag
    /// match first, then snapshots at or before the event day, then the
    /// closest in absolute day distance.
    async fn select_snapshot(
        &self,
        brand: &str,
        tag: &str,
        event_day: NaiveDate,
    ) -> Result<Option<ConfidenceScore>> {
        let lo = (event_day - chrono::Duration::days(SNAPSHOT_WINDOW_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        let hi = (event_day + chrono::Duration::days(SNAPSHOT_WINDOW_DAYS))
            .format("%Y-%m-%d")
            .to_string();

        let rows = sqlx::query_as::<_, ConfidenceScore>(
            r#"
            SELECT id, day, brand, tag, scoring_version,
                   acceleration_score, intent_score, spread_score, baseline_score,
                   suppression_score, final_confidence, band, gate_failed_reason,
                   details, computed_at
            FROM confidence_scores
            WHERE brand = ? AND scoring_version = ? AND day BETWEEN ? AND ?
            "#,
        )
        .bind(brand)
        .bind(SCORING_VERSION)
        .bind(&lo)
        .bind(&hi)
        .fetch_all(&self.db)
        .await?;

        let event_day_str = event_day.format("%Y-%m-%d").to_string();
        let best = rows.into_iter().min_by_key(|s| {
            let tag_mismatch = if s.tag == tag { 0 } else { 1 };
            let after_event = if s.day.as_str() <= event_day_str.as_str() {
                0
            } else {
                1
            };
            let distance = day_distance(&s.day, &event_day_str);
            (tag_mismatch, after_event, distance, std::cmp::Reverse(s.id))
        });

        Ok(best)
    }

    /// Sanitized evidence excerpts mentioning the brand within the window,
    /// newest first.
    async fn fetch_evidence(
        &self,
        brand: &str,
        event_day: NaiveDate,
    ) -> Result<Vec<EvidenceExcerpt>> {
        let since = (event_day - chrono::Duration::days(EVIDENCE_WINDOW_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        let until = (event_day + chrono::Duration::days(1))
            .format("%Y-%m-%d")
            .to_string();

        #[derive(sqlx::FromRow)]
        struct EvidenceRow {
            processed_id: i64,
            body: String,
            posted_at: String,
            meta: String,
            intent: String,
            sentiment: String,
        }

        let rows = sqlx::query_as::<_, EvidenceRow>(
            r#"
            SELECT p.id AS processed_id, r.body, r.posted_at, r.meta, p.intent, p.sentiment
            FROM processed_posts p
            JOIN raw_posts r ON r.id = p.raw_id
            WHERE date(r.posted_at) >= ? AND date(r.posted_at) < ?
              AND EXISTS (
                  SELECT 1 FROM json_each(p.brands) b WHERE b.value = ? COLLATE NOCASE
              )
            ORDER BY r.posted_at DESC
            LIMIT ?
            "#,
        )
        .bind(&since)
        .bind(&until)
        .bind(brand)
        .bind(MAX_EXCERPTS as i64)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let meta: serde_json::Value =
                    serde_json::from_str(&r.meta).unwrap_or(serde_json::Value::Null);
                EvidenceExcerpt {
                    processed_id: r.processed_id,
                    community: meta
                        .get("community")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    posted_at: r.posted_at,
                    text: clip(&sanitize_text(&r.body), MAX_EXCERPT_CHARS),
                    intent: r.intent,
                    sentiment: r.sentiment,
                }
            })
            .collect())
    }
}

/// Lowercase alphanumeric slug for filesystem paths.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
        } else if matches!(ch, ' ' | '-' | '_' | '.') && !out.ends_with('-') {
            out.push('-');
        }
    }
    let slug = out.trim_matches('-').to_string();
    if slug.is_empty() {
        "unknown-entity".to_string()
    } else {
        slug
    }
}

/// Bundles are append-only history; refuse to overwrite.
fn ensure_append_only(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::Internal(format!(
            "Refusing to overwrite existing artifact: {}",
            path.display()
        )));
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Write a gzipped canonical-JSON bundle. Returns the SHA-256 of the
/// uncompressed bytes, which is the bundle's content address.
fn write_bundle(path: &Path, bundle: &serde_json::Value) -> Result<String> {
    // serde_json maps iterate in sorted key order, so this serialization is
    // canonical for hashing.
    let raw = serde_json::to_vec_pretty(bundle)
        .map_err(|e| Error::Internal(format!("bundle serialization failed: {e}")))?;
    let digest = sha256_hex(&raw);

    let file = std::fs::File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&raw)?;
    encoder.finish()?;

    Ok(digest)
}

/// Absolute distance in days between two YYYY-MM-DD strings.
fn day_distance(a: &str, b: &str) -> i64 {
    match (
        NaiveDate::parse_from_str(a, "%Y-%m-%d"),
        NaiveDate::parse_from_str(b, "%Y-%m-%d"),
    ) {
        (Ok(a), Ok(b)) => (a - b).num_days().abs(),
        _ => i64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_brand_names() {
        assert_eq!(slugify("Hoka"), "hoka");
        assert_eq!(slugify("On Running"), "on-running");
        assert_eq!(slugify("  Duluth  Trading Co. "), "duluth-trading-co");
        assert_eq!(slugify("!!!"), "unknown-entity");
    }

    #[test]
    fn day_distance_is_absolute() {
        assert_eq!(day_distance("2026-07-01", "2026-07-03"), 2);
        assert_eq!(day_distance("2026-07-03", "2026-07-01"), 2);
        assert_eq!(day_distance("garbage", "2026-07-01"), i64::MAX);
    }

    #[test]
    fn bundle_hash_is_over_uncompressed_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json.gz");
        let bundle = serde_json::json!({"b": 2, "a": 1});

        let sha = write_bundle(&path, &bundle).unwrap();

        // Decompress and verify the hash matches the content.
        let file = std::fs::File::open(&path).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(file);
        let mut raw = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut raw).unwrap();
        assert_eq!(sha, sha256_hex(&raw));

        // Canonical: same value serializes to the same hash.
        let path2 = dir.path().join("bundle2.json.gz");
        let sha2 = write_bundle(&path2, &serde_json::json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(sha, sha2);
    }

    #[test]
    fn append_only_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json.gz");
        std::fs::write(&path, b"existing").unwrap();
        assert!(ensure_append_only(&path).is_err());
    }
}

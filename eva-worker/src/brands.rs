//! Brand to ticker mapping
//!
//! Looks up brands against the mapping table (case-insensitive) and, when a
//! brand is unmapped, searches the market data provider for its parent
//! company. Lookups that fail or come back ambiguous are recorded with a
//! NULL ticker so operators can review them; failures never block the
//! pipeline.

use eva_common::config::MarketSettings;
use eva_common::db::models::BrandTicker;
use eva_common::Result;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Outcome classification for one mapping attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingStatus {
    AlreadyMapped,
    Mapped,
    NotFound,
    Ambiguous,
    RateLimited,
    ApiError,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct MappingResult {
    pub brand: String,
    pub status: MappingStatus,
    pub ticker: Option<String>,
    pub parent_company: Option<String>,
    pub material: bool,
    pub exchange: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    symbol: String,
    name: String,
    #[serde(default)]
    exchange: Option<String>,
}

pub struct BrandMapper {
    db: SqlitePool,
    http_client: reqwest::Client,
    cfg: MarketSettings,
    last_request: Mutex<Option<Instant>>,
}

impl BrandMapper {
    pub fn new(db: SqlitePool, cfg: MarketSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            db,
            http_client,
            cfg,
            last_request: Mutex::new(None),
        })
    }

    /// Case-insensitive mapping lookup.
    pub async fn lookup(&self, brand: &str) -> Result<Option<BrandTicker>> {
        let row = sqlx::query_as::<_, BrandTicker>(
            r#"
            SELECT id, brand, ticker, parent_company, material, exchange, notes
            FROM brand_ticker_map
            WHERE brand = TRIM(?) COLLATE NOCASE
            "#,
        )
        .bind(brand)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    /// Upsert a manual mapping (operator CLI).
    pub async fn map_brand(
        &self,
        brand: &str,
        ticker: Option<&str>,
        material: bool,
        parent_company: Option<&str>,
        exchange: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO brand_ticker_map (brand, ticker, parent_company, material, exchange, notes)
            VALUES (TRIM(?), ?, ?, ?, ?, 'manual mapping')
            ON CONFLICT (brand) DO UPDATE SET
                ticker = excluded.ticker,
                parent_company = excluded.parent_company,
                material = excluded.material,
                exchange = excluded.exchange,
                notes = excluded.notes
            "#,
        )
        .bind(brand)
        .bind(ticker)
        .bind(parent_company)
        .bind(material)
        .bind(exchange)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Brands that have produced signal events but have no mapping yet.
    pub async fn list_unmapped(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT se.brand
            FROM signal_events se
            WHERE se.brand <> ''
              AND NOT EXISTS (
                  SELECT 1 FROM brand_ticker_map m
                  WHERE m.brand = se.brand COLLATE NOCASE
              )
            ORDER BY se.brand
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|(b,)| b).collect())
    }

    /// Make sure a brand has a mapping row, searching the provider when it
    /// doesn't. Non-blocking: every failure mode returns a status instead
    /// of an error.
    pub async fn ensure_mapped(&self, brand: &str) -> Result<MappingResult> {
        let brand = brand.trim();

        if let Some(existing) = self.lookup(brand).await? {
            return Ok(MappingResult {
                brand: brand.to_string(),
                status: MappingStatus::AlreadyMapped,
                ticker: existing.ticker,
                parent_company: existing.parent_company,
                material: existing.material,
                exchange: existing.exchange,
            });
        }

        let hits = match self.search_provider(brand).await {
            SearchOutcome::Hits(hits) => hits,
            SearchOutcome::RateLimited => {
                return Ok(self.unresolved(brand, MappingStatus::RateLimited))
            }
            SearchOutcome::Error => return Ok(self.unresolved(brand, MappingStatus::ApiError)),
            SearchOutcome::Disabled => {
                return Ok(self.unresolved(brand, MappingStatus::Disabled))
            }
        };

        if hits.is_empty() {
            // Record the miss so operators can map it by hand.
            self.record_unmapped(brand, "no provider match").await?;
            return Ok(self.unresolved(brand, MappingStatus::NotFound));
        }

        // A single confident hit maps automatically; several plausible hits
        // go to the operator instead of guessing.
        let exact: Vec<&SearchHit> = hits
            .iter()
            .filter(|h| normalize_company(&h.name).contains(&normalize_company(brand)))
            .collect();

        let chosen = match (exact.len(), hits.len()) {
            (1, _) => exact[0],
            (0, 1) => &hits[0],
            _ => {
                self.record_unmapped(brand, "ambiguous provider matches").await?;
                return Ok(self.unresolved(brand, MappingStatus::Ambiguous));
            }
        };

        let material = determine_materiality(brand, &chosen.name);
        sqlx::query(
            r#"
            INSERT INTO brand_ticker_map (brand, ticker, parent_company, material, exchange, notes)
            VALUES (TRIM(?), ?, ?, ?, ?, 'provider lookup')
            ON CONFLICT (brand) DO NOTHING
            "#,
        )
        .bind(brand)
        .bind(&chosen.symbol)
        .bind(&chosen.name)
        .bind(material)
        .bind(&chosen.exchange)
        .execute(&self.db)
        .await?;

        tracing::info!(
            brand,
            ticker = %chosen.symbol,
            parent = %chosen.name,
            material,
            "Brand mapped"
        );

        Ok(MappingResult {
            brand: brand.to_string(),
            status: MappingStatus::Mapped,
            ticker: Some(chosen.symbol.clone()),
            parent_company: Some(chosen.name.clone()),
            material,
            exchange: chosen.exchange.clone(),
        })
    }

    fn unresolved(&self, brand: &str, status: MappingStatus) -> MappingResult {
        MappingResult {
            brand: brand.to_string(),
            status,
            ticker: None,
            parent_company: None,
            material: false,
            exchange: None,
        }
    }

    async fn record_unmapped(&self, brand: &str, note: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO brand_ticker_map (brand, ticker, material, notes)
            VALUES (TRIM(?), NULL, 0, ?)
            ON CONFLICT (brand) DO NOTHING
            "#,
        )
        .bind(brand)
        .bind(note)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let min_interval = Duration::from_millis(self.cfg.rate_limit_ms);
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn search_provider(&self, brand: &str) -> SearchOutcome {
        let Some(api_key) = &self.cfg.api_key else {
            tracing::debug!("No market API key configured; provider lookups disabled");
            return SearchOutcome::Disabled;
        };

        self.pace().await;

        let url = format!("{}/search-name", self.cfg.base_url.trim_end_matches('/'));
        let response = self
            .http_client
            .get(&url)
            .query(&[("query", brand), ("limit", "10"), ("apikey", api_key)])
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().as_u16() == 429 => {
                tracing::warn!(brand, "Market provider rate limited");
                SearchOutcome::RateLimited
            }
            Ok(resp) if resp.status().is_success() => match resp.json::<Vec<SearchHit>>().await {
                Ok(hits) => SearchOutcome::Hits(hits),
                Err(e) => {
                    tracing::error!(brand, error = %e, "Unparseable provider search response");
                    SearchOutcome::Error
                }
            },
            Ok(resp) => {
                tracing::error!(brand, status = %resp.status(), "Provider search error");
                SearchOutcome::Error
            }
            Err(e) => {
                tracing::error!(brand, error = %e, "Provider search request failed");
                SearchOutcome::Error
            }
        }
    }
}

enum SearchOutcome {
    Hits(Vec<SearchHit>),
    RateLimited,
    Error,
    Disabled,
}

const COMPANY_SUFFIXES: &[&str] = &[
    " inc", " inc.", " corp", " corp.", " co", " co.", " ltd", " ltd.", " llc", " plc",
    " holdings", " group", " company", " corporation", " international", " intl",
];

fn normalize_company(name: &str) -> String {
    let mut n = name.to_lowercase().trim().to_string();
    for suffix in COMPANY_SUFFIXES {
        if let Some(stripped) = n.strip_suffix(suffix) {
            n = stripped.trim().to_string();
        }
    }
    n
}

/// Heuristic materiality: a brand that is essentially the company name is a
/// pure play; a brand buried inside a conglomerate needs manual review.
pub fn determine_materiality(brand: &str, company: &str) -> bool {
    let brand_clean = normalize_company(brand);
    let company_clean = normalize_company(company);

    if brand_clean.is_empty() || company_clean.is_empty() {
        return false;
    }
    if brand_clean == company_clean {
        return true;
    }

    if brand_clean.contains(&company_clean) || company_clean.contains(&brand_clean) {
        let len_ratio = brand_clean.len() as f64 / company_clean.len().max(1) as f64;
        if len_ratio > 0.6 {
            return true;
        }
    }

    let brand_words: std::collections::HashSet<&str> = brand_clean.split_whitespace().collect();
    let company_words: std::collections::HashSet<&str> = company_clean.split_whitespace().collect();
    if !brand_words.is_empty() {
        let overlap = brand_words.intersection(&company_words).count();
        if overlap as f64 / brand_words.len() as f64 >= 0.5 {
            return true;
        }
    }

    false
}

//! Community feed client
//!
//! Fetches recent posts from a community's public JSON listing endpoint
//! (`<base>/r/<community>/new.json?limit=N`) with a conservative global
//! pacing delay between requests. Feed failures are per-community: the
//! conductor logs and moves on.

use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const USER_AGENT: &str = "eva-finance/0.1 (text post ingestion; deterministic)";

/// Feed client errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by feed host")]
    RateLimited,

    #[error("Feed error {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One post as returned by the feed listing.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPost {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub permalink: String,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: FeedPost,
}

/// Pacing state shared across all feed requests in a process.
struct Pacer {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl Pacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Feed pacing: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Community feed client with global pacing.
pub struct FeedClient {
    http_client: reqwest::Client,
    base_url: String,
    pacer: Arc<Pacer>,
}

impl FeedClient {
    pub fn new(base_url: Option<String>, pace: Duration) -> Result<Self, FeedError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FeedError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            pacer: Arc::new(Pacer::new(pace)),
        })
    }

    /// Fetch up to `limit` recent posts from one community.
    pub async fn fetch_recent(
        &self,
        community: &str,
        limit: usize,
    ) -> Result<Vec<FeedPost>, FeedError> {
        self.pacer.wait().await;

        let url = format!("{}/r/{}/new.json?limit={}", self.base_url, community, limit);
        tracing::debug!(community, url = %url, "Fetching feed");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FeedError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status(status.as_u16(), truncate(&body, 200)));
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))?;

        let posts: Vec<FeedPost> = listing.data.children.into_iter().map(|c| c.data).collect();
        tracing::info!(community, fetched = posts.len(), "Fetched feed posts");
        Ok(posts)
    }
}

fn truncate(s: &str, n: usize) -> String {
    if s.len() <= n {
        s.to_string()
    } else {
        let mut end = n;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

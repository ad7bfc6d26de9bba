//! Ingestion run cycle
//!
//! One cycle fetches each configured community's recent posts, filters and
//! normalizes them, and posts every valid envelope to the admission
//! endpoint. Feed failures skip to the next community; repeated admission
//! failures abort the cycle (the endpoint is the one hard dependency).

use crate::admission::{AdmissionClient, AdmissionError, Delivery};
use crate::feed::{FeedClient, FeedError};
use crate::filter;
use uuid::Uuid;

/// How many consecutive admission failures abort the cycle.
const MAX_CONSECUTIVE_ADMISSION_FAILURES: u32 = 5;

/// Counters for one ingestion cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub communities_processed: usize,
    pub posts_fetched: usize,
    pub posts_filtered: usize,
    pub posts_posted: usize,
    pub posts_duplicate: usize,
    pub posts_failed: usize,
}

pub struct Conductor {
    communities: Vec<String>,
    limit: usize,
    feed: FeedClient,
    admission: AdmissionClient,
}

impl Conductor {
    pub fn new(
        communities: Vec<String>,
        limit: usize,
        feed: FeedClient,
        admission: AdmissionClient,
    ) -> Self {
        Self {
            communities,
            limit,
            feed,
            admission,
        }
    }

    /// Run one full cycle over all configured communities.
    pub async fn run_cycle(&self) -> CycleStats {
        let cycle_id = Uuid::new_v4();
        let mut stats = CycleStats::default();

        tracing::info!(
            %cycle_id,
            communities = self.communities.len(),
            limit = self.limit,
            api_url = self.admission.api_url(),
            "Starting ingestion cycle"
        );

        for community in &self.communities {
            match self.process_community(community, &mut stats).await {
                Ok(()) => stats.communities_processed += 1,
                Err(CycleAbort::Feed) => {
                    // Already logged; move on to the next community.
                }
                Err(CycleAbort::Admission) => {
                    tracing::error!(
                        %cycle_id,
                        "Admission endpoint unreachable, aborting cycle"
                    );
                    break;
                }
            }
        }

        tracing::info!(
            %cycle_id,
            communities = stats.communities_processed,
            fetched = stats.posts_fetched,
            filtered = stats.posts_filtered,
            posted = stats.posts_posted,
            duplicates = stats.posts_duplicate,
            failures = stats.posts_failed,
            "Ingestion cycle complete"
        );

        stats
    }

    async fn process_community(
        &self,
        community: &str,
        stats: &mut CycleStats,
    ) -> Result<(), CycleAbort> {
        let posts = match self.feed.fetch_recent(community, self.limit).await {
            Ok(posts) => posts,
            Err(FeedError::RateLimited) => {
                tracing::warn!(community, "Feed rate limited, skipping community this cycle");
                return Err(CycleAbort::Feed);
            }
            Err(e) => {
                tracing::error!(community, error = %e, "Feed fetch failed");
                return Err(CycleAbort::Feed);
            }
        };

        stats.posts_fetched += posts.len();

        let valid: Vec<_> = posts.iter().filter(|p| filter::is_valid_text_post(p)).collect();
        stats.posts_filtered += posts.len() - valid.len();

        tracing::info!(
            community,
            valid = valid.len(),
            filtered = posts.len() - valid.len(),
            "Filtered feed posts"
        );

        let mut consecutive_failures = 0u32;

        for post in valid {
            let envelope = filter::normalize(post, community);

            match self.admission.post_envelope(&envelope).await {
                Ok(Delivery::Accepted(id)) => {
                    stats.posts_posted += 1;
                    consecutive_failures = 0;
                    tracing::debug!(platform_id = %envelope.platform_id, id, "Posted");
                }
                Ok(Delivery::Duplicate(id)) => {
                    stats.posts_duplicate += 1;
                    consecutive_failures = 0;
                    tracing::debug!(platform_id = %envelope.platform_id, id, "Duplicate");
                }
                Err(AdmissionError::Rejected { status, .. }) => {
                    // This envelope is malformed; skip it, the rest are fine.
                    stats.posts_failed += 1;
                    consecutive_failures = 0;
                    tracing::warn!(
                        platform_id = %envelope.platform_id,
                        status,
                        "Envelope rejected by admission endpoint"
                    );
                }
                Err(e) => {
                    stats.posts_failed += 1;
                    consecutive_failures += 1;
                    tracing::error!(
                        platform_id = %envelope.platform_id,
                        error = %e,
                        "Failed to post envelope"
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_ADMISSION_FAILURES {
                        return Err(CycleAbort::Admission);
                    }
                }
            }
        }

        Ok(())
    }
}

enum CycleAbort {
    Feed,
    Admission,
}

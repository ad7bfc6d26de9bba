//! Recommendation artifact generation
//!
//! For each `RECOMMENDATION_ELIGIBLE` event: build a content-addressed,
//! append-only evidence bundle, render a human-reviewable markdown draft,
//! and register an idempotent draft row. Nothing here notifies anyone;
//! drafts wait for human approval.

mod builder;
mod render;
mod sanitize;

pub use builder::RecommendationBuilder;
pub use sanitize::sanitize_text;

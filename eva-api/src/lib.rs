//! eva-api library interface
//!
//! Exposes the router and state for integration testing.

pub mod api;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use sqlx::SqlitePool;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Shared database connection pool
    pub db: SqlitePool,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

/// Build application router
///
/// - POST /intake/message - admit one post envelope (idempotent)
/// - GET /events - list signal events
/// - POST /events/:id/ack - acknowledge an event
/// - POST /drafts/:id/approve - human approval for a recommendation draft
/// - GET /health - health check
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::intake_routes())
        .merge(api::event_routes())
        .merge(api::draft_routes())
        .merge(api::health_routes())
        .with_state(state)
}

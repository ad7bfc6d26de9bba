//! Health check

use crate::AppState;
use axum::routing::get;
use axum::{Json, Router};

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

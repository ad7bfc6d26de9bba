//! Recommendation draft approval
//!
//! Drafts are registered by the worker with `approved = false`; nothing is
//! delivered until a human approves through this endpoint. Approval records
//! who approved and when.

use crate::{ApiError, ApiResult, AppState};
use axum::routing::post;
use axum::{
    extract::{Path, State},
    Json, Router,
};
use serde::Deserialize;

pub fn draft_routes() -> Router<AppState> {
    Router::new().route("/drafts/:id/approve", post(approve_draft))
}

#[derive(Debug, Deserialize)]
struct ApproveRequest {
    approver: String,
}

async fn approve_draft(
    State(state): State<AppState>,
    Path(draft_id): Path<i64>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.approver.trim().is_empty() {
        return Err(ApiError::BadRequest("approver must not be empty".into()));
    }

    let updated: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE recommendation_drafts
        SET approved = 1,
            approved_by = ?,
            approved_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        RETURNING id
        "#,
    )
    .bind(req.approver.trim())
    .bind(draft_id)
    .fetch_optional(&state.db)
    .await?;

    match updated {
        Some((id,)) => {
            tracing::info!(draft_id = id, approver = %req.approver.trim(), "Draft approved");
            Ok(Json(serde_json::json!({ "status": "ok", "id": id })))
        }
        None => Err(ApiError::NotFound(format!("draft {draft_id}"))),
    }
}

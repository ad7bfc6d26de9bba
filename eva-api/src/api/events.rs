//! Signal event listing and acknowledgement

use crate::{ApiError, ApiResult, AppState};
use axum::routing::{get, post};
use axum::{
    extract::{Path, Query, State},
    Json, Router,
};
use eva_common::db::models::SignalEvent;
use serde::{Deserialize, Serialize};

pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/:id/ack", post(ack_event))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    ack: bool,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
struct EventView {
    id: i64,
    kind: String,
    tag: String,
    brand: String,
    day: String,
    severity: String,
    payload: serde_json::Value,
    created_at: String,
    acknowledged: bool,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    count: usize,
    events: Vec<EventView>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let limit = query.limit.clamp(1, 500);

    let rows = sqlx::query_as::<_, SignalEvent>(
        r#"
        SELECT id, kind, tag, brand, day, severity, payload, acknowledged, created_at
        FROM signal_events
        WHERE acknowledged = ?
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(query.ack)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    let events: Vec<EventView> = rows
        .into_iter()
        .map(|e| EventView {
            payload: e.payload_value(),
            id: e.id,
            kind: e.kind,
            tag: e.tag,
            brand: e.brand,
            day: e.day,
            severity: e.severity,
            created_at: e.created_at,
            acknowledged: e.acknowledged,
        })
        .collect();

    Ok(Json(ListResponse {
        count: events.len(),
        events,
    }))
}

async fn ack_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated: Option<(i64,)> =
        sqlx::query_as("UPDATE signal_events SET acknowledged = 1 WHERE id = ? RETURNING id")
            .bind(event_id)
            .fetch_optional(&state.db)
            .await?;

    match updated {
        Some((id,)) => Ok(Json(serde_json::json!({ "status": "ok", "id": id }))),
        None => Err(ApiError::NotFound(format!("event {event_id}"))),
    }
}

//! Raw post admission
//!
//! `POST /intake/message` persists exactly one row per `(source,
//! platform_id)`. Duplicate deliveries are expected from the conductor and
//! return the original row's id; the stored text is never rewritten.

use crate::{ApiError, ApiResult, AppState};
use axum::routing::post;
use axum::{extract::State, Json, Router};
use eva_common::api::{Envelope, IntakeResponse};

pub fn intake_routes() -> Router<AppState> {
    Router::new().route("/intake/message", post(intake_message))
}

fn validate(envelope: &Envelope) -> Result<(), ApiError> {
    if envelope.source.trim().is_empty() {
        return Err(ApiError::BadRequest("source must not be empty".into()));
    }
    if envelope.platform_id.trim().is_empty() {
        return Err(ApiError::BadRequest("platform_id must not be empty".into()));
    }
    if envelope.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".into()));
    }
    if chrono::DateTime::parse_from_rfc3339(&envelope.timestamp).is_err() {
        return Err(ApiError::BadRequest(format!(
            "timestamp must be RFC 3339, got {:?}",
            envelope.timestamp
        )));
    }
    Ok(())
}

async fn intake_message(
    State(state): State<AppState>,
    Json(envelope): Json<Envelope>,
) -> ApiResult<Json<IntakeResponse>> {
    validate(&envelope)?;

    let meta = serde_json::to_string(&envelope.meta)
        .map_err(|e| ApiError::Internal(format!("meta serialization failed: {e}")))?;

    let inserted: Option<(i64,)> = sqlx::query_as(
        r#"
        INSERT INTO raw_posts (source, platform_id, posted_at, body, url, meta)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (source, platform_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&envelope.source)
    .bind(&envelope.platform_id)
    .bind(&envelope.timestamp)
    .bind(&envelope.text)
    .bind(&envelope.url)
    .bind(&meta)
    .fetch_optional(&state.db)
    .await?;

    match inserted {
        Some((id,)) => {
            tracing::debug!(
                source = %envelope.source,
                platform_id = %envelope.platform_id,
                id,
                "Admitted raw post"
            );
            Ok(Json(IntakeResponse {
                status: "received".to_string(),
                duplicate: false,
                id,
            }))
        }
        None => {
            // Conflict: look up the original row so duplicates return a
            // stable id.
            let (id,): (i64,) =
                sqlx::query_as("SELECT id FROM raw_posts WHERE source = ? AND platform_id = ?")
                    .bind(&envelope.source)
                    .bind(&envelope.platform_id)
                    .fetch_one(&state.db)
                    .await?;

            Ok(Json(IntakeResponse {
                status: "received".to_string(),
                duplicate: true,
                id,
            }))
        }
    }
}

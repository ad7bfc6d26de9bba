//! eva-api - Admission Endpoint Service
//!
//! Accepts normalized post envelopes from the ingestion conductor and
//! persists exactly one raw-post row per `(source, platform_id)`. Also
//! exposes the operator read surface: signal event listing/acknowledgement
//! and recommendation draft approval.

use anyhow::Result;
use eva_api::{build_router, AppState};
use eva_common::config::Settings;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting eva-api (admission endpoint) v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;

    let pool = eva_common::db::connect(
        &settings.database.path,
        settings.database.pool_min,
        settings.database.pool_max,
    )
    .await?;
    info!("Database connection established");

    let state = AppState::new(pool);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.api.bind_addr).await?;
    info!("Listening on http://{}", settings.api.bind_addr);
    info!("Health check: http://{}/health", settings.api.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

//! Database access for the EVA signal core
//!
//! All services share one SQLite database; it is the only shared mutable
//! state in the system. Tables are created idempotently at startup.

pub mod init;
pub mod models;
pub mod projections;

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// Connect to the shared database, creating the file and schema if needed.
///
/// Connection options apply to every pooled connection: foreign keys on and
/// a 5s busy timeout for writer contention.
pub async fn connect(path: &Path, pool_min: u32, pool_max: u32) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::debug!("Connecting to database: {}", path.display());

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .min_connections(pool_min)
        .max_connections(pool_max)
        .connect_with(options)
        .await?;

    init::init_schema(&pool).await?;

    Ok(pool)
}

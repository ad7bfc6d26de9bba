//! Common error types for the EVA signal core

use thiserror::Error;

/// Common result type for EVA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the EVA services
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Permanent provider failure: auth failures, contract violations, 4xx.
    #[error("{provider} error {status}: {message}")]
    Provider {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Transient provider failure: the caller may retry with backoff.
    #[error("{provider} rate limited")]
    RateLimited { provider: &'static str },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is worth retrying at the call site.
    ///
    /// Rate limits, timeouts and connection drops are transient; contract
    /// violations, validation failures and constraint violations are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::Database(e) => e.to_string().contains("database is locked"),
            _ => false,
        }
    }
}

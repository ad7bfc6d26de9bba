//! # EVA Common Library
//!
//! Shared code for the EVA-Finance signal core services:
//! - Configuration loading (environment first, optional TOML file)
//! - Common error types
//! - Database initialization, models and projection queries
//! - API envelope types shared between the admission endpoint and ingestion
//! - Database retry helper for transient lock contention

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod retry;

pub use error::{Error, Result};

//! eva-worker library interface
//!
//! Everything downstream of the raw-post store: extraction, trigger
//! emission, confidence scoring, search-interest validation, recommendation
//! drafting, notification delivery, brand mapping and the paper-position
//! loop. All stages coordinate through the shared database and are safe to
//! run concurrently across processes.

pub mod brands;
pub mod extract;
pub mod extractor;
pub mod notify;
pub mod paper;
pub mod reco;
pub mod scoring;
pub mod trends;
pub mod triggers;

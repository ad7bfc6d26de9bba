//! API types shared between the admission endpoint and its clients

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One normalized post envelope, as accepted by `POST /intake/message`.
///
/// `(source, platform_id)` is the idempotency key: posting the same envelope
/// twice yields the same stored row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Origin system tag, e.g. "reddit".
    pub source: String,
    /// The source's own id for this post.
    pub platform_id: String,
    /// Event time, RFC 3339 UTC.
    pub timestamp: String,
    /// Post body (title and text combined by the conductor).
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Free-form metadata: community name, hashed author, original id.
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

/// Response to an intake POST. `duplicate` is true when the envelope had
/// already been admitted; `id` is the stored row either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeResponse {
    pub status: String,
    #[serde(default)]
    pub duplicate: bool,
    pub id: i64,
}
